use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rskafka::client::partition::{OffsetAt, PartitionClient};
use rskafka::record::RecordAndOffset;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use linker_api::{BrokerError, RecordSource};

use crate::{KafkaSourceConfig, broker_error, connect_partition};

const FETCH_ERROR_BACKOFF: Duration = Duration::from_secs(1);

// ═══════════════════════════════════════════════════════════════
//  KafkaSource: fetch-задача → mpsc
// ═══════════════════════════════════════════════════════════════

/// Одна партиция входной темы, начиная с последнего offset на момент
/// подключения. Старые сообщения не перечитываются.
///
/// Fetch идёт в фоновой задаче, `recv` только забирает из канала.
pub struct KafkaSource {
    topic: String,
    rx: mpsc::Receiver<Result<Vec<u8>, BrokerError>>,
    token: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl KafkaSource {
    /// Подключение и чтение начального offset. Ошибка: фатальна для запуска.
    pub async fn connect(config: &KafkaSourceConfig) -> Result<Self, BrokerError> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let client = connect_partition(&config.brokers, &config.topic, config.partition, timeout).await?;

        let offset = tokio::time::timeout(timeout, client.get_offset(OffsetAt::Latest))
            .await
            .map_err(|_| broker_error("offset", "timed out"))?
            .map_err(|e| broker_error("offset", e))?;
        tracing::info!(topic = %config.topic, partition = config.partition, offset, "kafka source subscribed");

        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let token = CancellationToken::new();
        let fetch = FetchLimits { max_bytes: config.max_bytes.max(1), max_wait_ms: config.max_wait_ms };
        let reader = tokio::spawn(fetch_loop(client, offset, fetch, tx, token.clone()));

        Ok(Self { topic: config.topic.clone(), rx, token, reader: Some(reader) })
    }
}

impl RecordSource for KafkaSource {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Vec<u8>, BrokerError>>> + Send + '_>> {
        Box::pin(async move { self.rx.recv().await })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.token.cancel();
            self.rx.close();
            if let Some(reader) = self.reader.take() {
                if let Err(e) = reader.await {
                    tracing::warn!(topic = %self.topic, error = %e, "kafka fetch task failed");
                }
            }
            tracing::info!(topic = %self.topic, "kafka source closed");
            Ok(())
        })
    }
}

impl Drop for KafkaSource {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug, Clone, Copy)]
struct FetchLimits {
    max_bytes: i32,
    max_wait_ms: i32,
}

async fn fetch_loop(
    client: Arc<PartitionClient>,
    mut offset: i64,
    limits: FetchLimits,
    tx: mpsc::Sender<Result<Vec<u8>, BrokerError>>,
    token: CancellationToken,
) {
    'fetch: loop {
        let fetched = tokio::select! {
            fetched = client.fetch_records(offset, 1..limits.max_bytes, limits.max_wait_ms) => fetched,
            _ = token.cancelled() => break,
        };

        match fetched {
            Ok((batch, high_watermark)) => {
                let values = take_values(batch, &mut offset);
                tracing::trace!(offset, high_watermark, records = values.len(), "kafka fetch");
                for value in values {
                    tokio::select! {
                        sent = tx.send(Ok(value)) => {
                            if sent.is_err() {
                                break 'fetch;
                            }
                        }
                        _ = token.cancelled() => break 'fetch,
                    }
                }
            }
            Err(e) => {
                tracing::warn!(offset, error = %e, "kafka fetch failed");
                tokio::select! {
                    _ = tx.send(Err(broker_error("fetch", e))) => {}
                    _ = token.cancelled() => break,
                }
                tokio::select! {
                    _ = tokio::time::sleep(FETCH_ERROR_BACKOFF) => {}
                    _ = token.cancelled() => break,
                }
            }
        }
    }
    tracing::debug!(offset, "kafka fetch task finished");
}

/// Значения записей пачки; `offset` сдвигается за последнюю запись.
/// Записи без value (tombstone) пропускаются.
fn take_values(batch: Vec<RecordAndOffset>, offset: &mut i64) -> Vec<Vec<u8>> {
    let mut values = Vec::with_capacity(batch.len());
    for item in batch {
        *offset = (*offset).max(item.offset + 1);
        if let Some(value) = item.record.value {
            values.push(value);
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use rskafka::record::Record;

    fn item(offset: i64, value: Option<&[u8]>) -> RecordAndOffset {
        RecordAndOffset {
            record: Record {
                key: None,
                value: value.map(<[u8]>::to_vec),
                headers: BTreeMap::new(),
                timestamp: chrono::Utc::now(),
            },
            offset,
        }
    }

    #[test]
    fn offset_moves_past_last_record() {
        let mut offset = 40;
        let values = take_values(vec![item(40, Some(b"a")), item(41, None), item(42, Some(b"b"))], &mut offset);
        assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(offset, 43);
    }

    #[test]
    fn empty_fetch_keeps_offset() {
        let mut offset = 7;
        assert!(take_values(Vec::new(), &mut offset).is_empty());
        assert_eq!(offset, 7);
    }

    #[test]
    fn stale_records_never_rewind() {
        // compacted тема может вернуть записи ниже запрошенного offset
        let mut offset = 10;
        take_values(vec![item(8, Some(b"old"))], &mut offset);
        assert_eq!(offset, 10);
    }
}
