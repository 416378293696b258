use linker_api::BrokerError;

use crate::runner::Stage;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline already started")]
    AlreadyStarted,

    #[error("stage {stage} did not stop within {timeout_ms} ms, aborted")]
    StopTimeout { stage: Stage, timeout_ms: u64 },

    #[error("stage {stage} panicked")]
    StagePanicked { stage: Stage },

    #[error("closing {stage} broker client: {source}")]
    Close { stage: Stage, source: BrokerError },
}
