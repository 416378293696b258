mod framing;
mod sink;
mod source;

pub use framing::LineSplitter;
pub use sink::TcpLineSink;
pub use source::TcpLineSource;

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

/// Входная сторона: слушать producers, одна запись: одна строка.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TcpSourceConfig {
    /// `host:port` для bind.
    pub listen: String,
    /// Максимальная длина строки в байтах (0 = без ограничения).
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Буфер принятых строк до intake-стадии.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

impl TcpSourceConfig {
    pub fn new(listen: impl Into<String>) -> Self {
        Self { listen: listen.into(), max_line_length: default_max_line_length(), buffer: default_buffer() }
    }
}

/// Выходная сторона: одно соединение к collector'у.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TcpSinkConfig {
    /// `host:port` collector'а.
    pub connect: String,
    /// Очередь записей до writer-задачи.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// Сколько `close()` ждёт дописывания очереди до сброса соединения.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

impl TcpSinkConfig {
    pub fn new(connect: impl Into<String>) -> Self {
        Self { connect: connect.into(), buffer: default_buffer(), close_timeout_ms: default_close_timeout_ms() }
    }
}

fn default_max_line_length() -> usize {
    1024 * 1024
}
fn default_buffer() -> usize {
    1024
}
fn default_close_timeout_ms() -> u64 {
    5000
}
