use std::time::Duration;

use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  Pipeline Config
// ═══════════════════════════════════════════════════════════════

/// Параметры исполнения трёх стадий (секция `[pipeline]`).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Ёмкость handoff-очередей между стадиями. 0: rendezvous.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Сколько ждать выхода каждой стадии при stop() до abort.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    /// Пауза intake после ошибки брокера.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl PipelineConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            stop_timeout_ms: default_stop_timeout_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

fn default_queue_capacity() -> usize {
    0
}
fn default_stop_timeout_ms() -> u64 {
    5000
}
fn default_error_backoff_ms() -> u64 {
    1000
}
