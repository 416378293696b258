use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use impairment_store::{FileStore, spawn_watcher};
use linker_api::{RecordSink, RecordSource};
use pipeline::{Enricher, Pipeline};
use transport_kafka::{KafkaSink, KafkaSource};
use transport_tcp::{TcpLineSink, TcpLineSource};

use crate::config::{Effective, InputTransport, OutputTransport, StartArgs};
use crate::error::ServerError;

pub async fn run(args: StartArgs) -> Result<(), ServerError> {
    tracing::info!("clab-telemetry-linker starting");

    let eff = Effective::new(&args)?;
    tracing::info!(
        input = ?eff.input,
        output = ?eff.output,
        store = %eff.store_path.display(),
        queue_capacity = eff.pipeline.queue_capacity,
        "effective config"
    );

    // --- Impairment store ---
    let store = Arc::new(FileStore::open(&eff.store_path)?);
    let token = CancellationToken::new();
    let watcher = (eff.watch_interval_ms > 0).then(|| {
        spawn_watcher(store.clone(), Duration::from_millis(eff.watch_interval_ms), token.clone())
    });

    // --- Broker clients ---
    let source = open_source(&eff.input).await?;
    let sink = open_sink(&eff.output).await?;

    // --- Pipeline ---
    let mut pipeline = Pipeline::new(source, sink, Enricher::new(store), eff.pipeline);
    pipeline.start()?;
    tracing::info!("pipeline started, press Ctrl+C to stop");

    let signal = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down...");

    let stopped = pipeline.stop().await;
    token.cancel();
    if let Some(handle) = watcher {
        join_watcher(handle).await;
    }

    signal?;
    stopped?;
    tracing::info!("clab-telemetry-linker stopped");
    Ok(())
}

async fn open_source(input: &InputTransport) -> Result<Box<dyn RecordSource>, ServerError> {
    let source: Box<dyn RecordSource> = match input {
        InputTransport::Tcp(config) => Box::new(TcpLineSource::bind(config).await?),
        InputTransport::Kafka(config) => Box::new(KafkaSource::connect(config).await?),
    };
    Ok(source)
}

async fn open_sink(output: &OutputTransport) -> Result<Box<dyn RecordSink>, ServerError> {
    let sink: Box<dyn RecordSink> = match output {
        OutputTransport::Tcp(config) => Box::new(TcpLineSink::connect(config).await?),
        OutputTransport::Kafka(config) => Box::new(KafkaSink::connect(config).await?),
    };
    Ok(sink)
}

/// Дождаться watcher'а; паника или отмена задачи только логируется.
async fn join_watcher(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "store watcher task failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watcher_failure_is_reported_not_propagated() {
        let finished = tokio::spawn(async {});
        assert!(join_watcher(finished).await);

        let panicked = tokio::spawn(async { panic!("reload blew up") });
        assert!(!join_watcher(panicked).await);

        let aborted = tokio::spawn(std::future::pending::<()>());
        aborted.abort();
        assert!(!join_watcher(aborted).await);
    }

    #[tokio::test]
    async fn tcp_transports_open_as_trait_objects() {
        let collector = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let input = InputTransport::Tcp(transport_tcp::TcpSourceConfig::new("127.0.0.1:0"));
        let output = OutputTransport::Tcp(transport_tcp::TcpSinkConfig::new(
            collector.local_addr().unwrap().to_string(),
        ));

        let mut source = open_source(&input).await.unwrap();
        let mut sink = open_sink(&output).await.unwrap();
        sink.close().await.unwrap();
        source.close().await.unwrap();
    }
}
