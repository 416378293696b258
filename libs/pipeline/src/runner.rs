use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use linker_api::{ErrorKind, LinkerError, Message, RecordSink, RecordSource};

use crate::config::PipelineConfig;
use crate::decoder::decode_record;
use crate::encoder::encode_line;
use crate::enricher::Enricher;
use crate::error::PipelineError;
use crate::handoff::{HandoffReceiver, HandoffSender, handoff};

// ═══════════════════════════════════════════════════════════════
//  Stage & state
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Intake,
    Enrichment,
    Publication,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Intake => f.write_str("intake"),
            Stage::Enrichment => f.write_str("enrichment"),
            Stage::Publication => f.write_str("publication"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StageStatus {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

/// Состояние стадии, видимое снаружи без блокировок.
#[derive(Debug)]
struct StageState(AtomicU8);

impl StageState {
    fn new() -> Self {
        Self(AtomicU8::new(StageStatus::Idle as u8))
    }

    fn set(&self, status: StageStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    fn get(&self) -> StageStatus {
        match self.0.load(Ordering::Acquire) {
            0 => StageStatus::Idle,
            1 => StageStatus::Running,
            2 => StageStatus::Stopping,
            _ => StageStatus::Stopped,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Stats
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct PipelineCounters {
    received: AtomicU64,
    decoded: AtomicU64,
    enriched: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl PipelineCounters {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Снимок счётчиков pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub decoded: u64,
    pub enriched: u64,
    pub published: u64,
    pub dropped: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Pipeline
// ═══════════════════════════════════════════════════════════════

struct StageHandle<T> {
    token: CancellationToken,
    handle: JoinHandle<T>,
}

struct Running {
    intake: StageHandle<Box<dyn RecordSource>>,
    enrichment: StageHandle<()>,
    publication: StageHandle<Box<dyn RecordSink>>,
}

/// Три стадии: intake (decode) → enrichment → publication (encode + send).
///
/// Стадии связаны handoff-очередями (по умолчанию rendezvous); каждая точка ожидания
/// гоняется в `select!` против токена своей стадии.
pub struct Pipeline {
    source: Option<Box<dyn RecordSource>>,
    sink: Option<Box<dyn RecordSink>>,
    enricher: Enricher,
    config: PipelineConfig,
    states: [Arc<StageState>; 3],
    counters: Arc<PipelineCounters>,
    running: Option<Running>,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn RecordSource>,
        sink: Box<dyn RecordSink>,
        enricher: Enricher,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source: Some(source),
            sink: Some(sink),
            enricher,
            config,
            states: [
                Arc::new(StageState::new()),
                Arc::new(StageState::new()),
                Arc::new(StageState::new()),
            ],
            counters: Arc::new(PipelineCounters::default()),
            running: None,
        }
    }

    /// Запустить стадии и вернуться сразу. Требует tokio runtime.
    /// Повторный запуск (в том числе после stop) не поддерживается.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        let (Some(source), Some(sink)) = (self.source.take(), self.sink.take()) else {
            return Err(PipelineError::AlreadyStarted);
        };

        let capacity = self.config.queue_capacity;
        let (decoded_tx, decoded_rx) = handoff::<Message>(capacity);
        let (enriched_tx, enriched_rx) = handoff::<Message>(capacity);

        for state in &self.states {
            state.set(StageStatus::Running);
        }

        let token = CancellationToken::new();
        let intake = spawn_intake(
            source,
            decoded_tx,
            self.config.error_backoff(),
            token.clone(),
            self.states[0].clone(),
            self.counters.clone(),
        );
        let intake = StageHandle { token, handle: intake };

        let token = CancellationToken::new();
        let enrichment = spawn_enrichment(
            self.enricher.clone(),
            decoded_rx,
            enriched_tx,
            token.clone(),
            self.states[1].clone(),
            self.counters.clone(),
        );
        let enrichment = StageHandle { token, handle: enrichment };

        let token = CancellationToken::new();
        let publication = spawn_publication(
            sink,
            enriched_rx,
            token.clone(),
            self.states[2].clone(),
            self.counters.clone(),
        );
        let publication = StageHandle { token, handle: publication };

        self.running = Some(Running { intake, enrichment, publication });
        tracing::info!(queue_capacity = capacity, "pipeline started");
        Ok(())
    }

    /// Остановить стадии по очереди (intake, enrichment, publication).
    /// Клиент брокера закрывается после выхода своей стадии. Стадия, не вышедшая за
    /// `stop_timeout`, прерывается; об этом сообщает первая ошибка.
    pub async fn stop(&mut self) -> Result<(), PipelineError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        let timeout = self.config.stop_timeout();
        let mut first_error = None;

        tracing::info!("stopping pipeline");

        match join_stage(Stage::Intake, running.intake, &self.states[0], timeout).await {
            Ok(mut source) => {
                if let Err(e) = source.close().await {
                    tracing::warn!(stage = %Stage::Intake, error = %e, "source close failed");
                    first_error.get_or_insert(PipelineError::Close { stage: Stage::Intake, source: e });
                }
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = join_stage(Stage::Enrichment, running.enrichment, &self.states[1], timeout).await {
            first_error.get_or_insert(e);
        }

        match join_stage(Stage::Publication, running.publication, &self.states[2], timeout).await {
            Ok(mut sink) => {
                if let Err(e) = sink.close().await {
                    tracing::warn!(stage = %Stage::Publication, error = %e, "sink close failed");
                    first_error.get_or_insert(PipelineError::Close { stage: Stage::Publication, source: e });
                }
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }

        let stats = self.stats();
        tracing::info!(
            received = stats.received,
            decoded = stats.decoded,
            enriched = stats.enriched,
            published = stats.published,
            dropped = stats.dropped,
            "pipeline stopped"
        );
        first_error.map_or(Ok(()), Err)
    }

    pub fn stage_states(&self) -> [(Stage, StageStatus); 3] {
        [
            (Stage::Intake, self.states[0].get()),
            (Stage::Enrichment, self.states[1].get()),
            (Stage::Publication, self.states[2].get()),
        ]
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            received: c.received.load(Ordering::Relaxed),
            decoded: c.decoded.load(Ordering::Relaxed),
            enriched: c.enriched.load(Ordering::Relaxed),
            published: c.published.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn join_stage<T>(
    stage: Stage,
    mut stage_handle: StageHandle<T>,
    state: &StageState,
    timeout: Duration,
) -> Result<T, PipelineError> {
    if state.get() != StageStatus::Stopped {
        state.set(StageStatus::Stopping);
    }
    stage_handle.token.cancel();

    let result = match tokio::time::timeout(timeout, &mut stage_handle.handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!(%stage, error = %e, "stage task failed");
            Err(PipelineError::StagePanicked { stage })
        }
        Err(_) => {
            tracing::warn!(%stage, timeout_ms = timeout.as_millis() as u64, "stage did not stop in time, aborting");
            stage_handle.handle.abort();
            Err(PipelineError::StopTimeout { stage, timeout_ms: timeout.as_millis() as u64 })
        }
    };
    state.set(StageStatus::Stopped);
    result
}

// ═══════════════════════════════════════════════════════════════
//  Stage tasks
// ═══════════════════════════════════════════════════════════════

fn log_drop(stage: Stage, counters: &PipelineCounters, err: &LinkerError) {
    PipelineCounters::inc(&counters.dropped);
    match err.kind() {
        ErrorKind::Skip => tracing::debug!(%stage, error = %err, "message skipped"),
        ErrorKind::Format => tracing::warn!(%stage, error = %err, "message dropped"),
        ErrorKind::Io => tracing::error!(%stage, error = %err, "message lost"),
    }
}

/// broker → decode → очередь A. Возвращает source для закрытия.
fn spawn_intake(
    mut source: Box<dyn RecordSource>,
    tx: HandoffSender<Message>,
    error_backoff: Duration,
    token: CancellationToken,
    state: Arc<StageState>,
    counters: Arc<PipelineCounters>,
) -> JoinHandle<Box<dyn RecordSource>> {
    let stage = Stage::Intake;
    tokio::spawn(async move {
        tracing::info!(%stage, "started");
        'outer: loop {
            let record = tokio::select! {
                record = source.recv() => record,
                _ = token.cancelled() => break,
            };

            let raw = match record {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    tracing::error!(%stage, error = %e, "broker receive error");
                    tokio::select! {
                        _ = tokio::time::sleep(error_backoff) => continue,
                        _ = token.cancelled() => break,
                    }
                }
                None => {
                    tracing::info!(%stage, "source closed");
                    break;
                }
            };
            PipelineCounters::inc(&counters.received);

            let messages = match decode_record(&raw) {
                Ok(messages) => messages,
                Err(e) => {
                    log_drop(stage, &counters, &e.into());
                    continue;
                }
            };

            for message in messages {
                tokio::select! {
                    sent = tx.send(message) => {
                        if sent.is_err() {
                            break 'outer;
                        }
                    }
                    _ = token.cancelled() => break 'outer,
                }
                PipelineCounters::inc(&counters.decoded);
            }
        }
        state.set(StageStatus::Stopped);
        tracing::info!(%stage, "finished");
        source
    })
}

/// очередь A → enrich → очередь B.
fn spawn_enrichment(
    enricher: Enricher,
    mut rx: HandoffReceiver<Message>,
    tx: HandoffSender<Message>,
    token: CancellationToken,
    state: Arc<StageState>,
    counters: Arc<PipelineCounters>,
) -> JoinHandle<()> {
    let stage = Stage::Enrichment;
    tokio::spawn(async move {
        tracing::info!(%stage, "started");
        loop {
            let message = tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                _ = token.cancelled() => break,
            };

            let enriched = match enricher.enrich(message) {
                Ok(enriched) => enriched,
                Err(e) => {
                    log_drop(stage, &counters, &e);
                    continue;
                }
            };
            tokio::select! {
                sent = tx.send(enriched) => {
                    if sent.is_err() {
                        break;
                    }
                }
                _ = token.cancelled() => break,
            }
            PipelineCounters::inc(&counters.enriched);
        }
        state.set(StageStatus::Stopped);
        tracing::info!(%stage, "finished");
    })
}

/// очередь B → encode → broker. Возвращает sink для закрытия.
fn spawn_publication(
    mut sink: Box<dyn RecordSink>,
    mut rx: HandoffReceiver<Message>,
    token: CancellationToken,
    state: Arc<StageState>,
    counters: Arc<PipelineCounters>,
) -> JoinHandle<Box<dyn RecordSink>> {
    let stage = Stage::Publication;
    tokio::spawn(async move {
        tracing::info!(%stage, "started");
        loop {
            let message = tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                _ = token.cancelled() => break,
            };

            let line = match encode_line(&message) {
                Ok(line) => line,
                Err(e) => {
                    log_drop(stage, &counters, &e);
                    continue;
                }
            };

            tokio::select! {
                sent = sink.send(line.into_bytes()) => match sent {
                    Ok(()) => PipelineCounters::inc(&counters.published),
                    Err(e) => log_drop(stage, &counters, &LinkerError::Publish(e)),
                },
                _ = token.cancelled() => break,
            }
        }
        state.set(StageStatus::Stopped);
        tracing::info!(%stage, "finished");
        sink
    })
}
