use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rskafka::client::partition::{Compression, PartitionClient};
use rskafka::record::Record;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use linker_api::{BrokerError, RecordSink};

use crate::{KafkaSinkConfig, connect_partition};

/// Сколько уже накопившихся записей уходит одним produce.
const MAX_BATCH: usize = 256;

// ═══════════════════════════════════════════════════════════════
//  KafkaSink: mpsc → producer-задача
// ═══════════════════════════════════════════════════════════════

/// Асинхронный producer: `send` кладёт запись в очередь, producer-задача
/// отправляет накопившееся пачками. Ошибка produce логируется, пачка теряется.
pub struct KafkaSink {
    topic: String,
    tx: Option<mpsc::Sender<Vec<u8>>>,
    producer: Option<JoinHandle<()>>,
    token: CancellationToken,
    close_timeout: Duration,
}

impl KafkaSink {
    pub async fn connect(config: &KafkaSinkConfig) -> Result<Self, BrokerError> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let client = connect_partition(&config.brokers, &config.topic, config.partition, timeout).await?;
        tracing::info!(topic = %config.topic, partition = config.partition, "kafka sink ready");

        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let token = CancellationToken::new();
        let producer = tokio::spawn(produce_loop(client, config.topic.clone(), rx, token.clone()));

        Ok(Self {
            topic: config.topic.clone(),
            tx: Some(tx),
            producer: Some(producer),
            token,
            close_timeout: Duration::from_millis(config.close_timeout_ms),
        })
    }
}

impl RecordSink for KafkaSink {
    fn send(&mut self, record: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let tx = self.tx.as_ref().ok_or(BrokerError::Closed)?;
            tx.send(record).await.map_err(|_| BrokerError::Closed)
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.tx = None;
            let Some(mut producer) = self.producer.take() else {
                return Ok(());
            };

            let result = match tokio::time::timeout(self.close_timeout, &mut producer).await {
                Ok(_) => Ok(()),
                Err(_) => {
                    tracing::warn!(topic = %self.topic, "kafka sink did not flush in time");
                    self.token.cancel();
                    let _ = producer.await;
                    Err(BrokerError::Rejected(format!(
                        "kafka topic {}: pending records not produced within {} ms",
                        self.topic,
                        self.close_timeout.as_millis()
                    )))
                }
            };
            tracing::info!(topic = %self.topic, "kafka sink closed");
            result
        })
    }
}

impl Drop for KafkaSink {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn produce_loop(
    client: Arc<PartitionClient>,
    topic: String,
    mut rx: mpsc::Receiver<Vec<u8>>,
    token: CancellationToken,
) {
    loop {
        let first = tokio::select! {
            record = rx.recv() => match record {
                Some(record) => record,
                None => break,
            },
            _ = token.cancelled() => break,
        };

        let mut batch = vec![to_record(first)];
        while batch.len() < MAX_BATCH {
            match rx.try_recv() {
                Ok(value) => batch.push(to_record(value)),
                Err(_) => break,
            }
        }

        let size = batch.len();
        let produced = tokio::select! {
            produced = client.produce(batch, Compression::NoCompression) => produced,
            _ = token.cancelled() => {
                tracing::warn!(%topic, records = size, "produce interrupted");
                break;
            }
        };
        match produced {
            Ok(offsets) => tracing::trace!(%topic, records = offsets.len(), "produced"),
            Err(e) => tracing::error!(%topic, records = size, error = %e, "failed to produce, records lost"),
        }
    }
    tracing::debug!(%topic, "kafka producer task finished");
}

/// Запись без ключа и заголовков с текущим временем.
fn to_record(value: Vec<u8>) -> Record {
    Record { key: None, value: Some(value), headers: BTreeMap::new(), timestamp: chrono::Utc::now() }
}
