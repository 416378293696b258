#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("store: {0}")]
    Store(#[from] impairment_store::StoreError),

    #[error("broker: {0}")]
    Broker(#[from] linker_api::BrokerError),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("node {0} not found in store")]
    NodeNotFound(String),

    #[error("command '{command}' failed: {detail}")]
    Command { command: String, detail: String },

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
