mod sink;
mod source;

use std::sync::Arc;
use std::time::Duration;

use rskafka::client::ClientBuilder;
use rskafka::client::partition::{PartitionClient, UnknownTopicHandling};

use linker_api::BrokerError;

pub use sink::KafkaSink;
pub use source::KafkaSource;

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

/// Входная тема: читается одна партиция с текущего конца.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct KafkaSourceConfig {
    /// Bootstrap-брокеры `host:port`.
    pub brokers: Vec<String>,
    pub topic: String,
    #[serde(default)]
    pub partition: i32,
    /// Сколько брокер держит fetch без новых данных.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: i32,
    /// Верхняя граница одного fetch, байт.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: i32,
    /// Буфер прочитанных записей до intake-стадии.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl KafkaSourceConfig {
    pub fn new(brokers: Vec<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers,
            topic: topic.into(),
            partition: 0,
            max_wait_ms: default_max_wait_ms(),
            max_bytes: default_max_bytes(),
            buffer: default_buffer(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Выходная тема: записи без ключа в одну партицию.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct KafkaSinkConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    #[serde(default)]
    pub partition: i32,
    /// Очередь записей до producer-задачи.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// Сколько `close()` ждёт отправки очереди.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl KafkaSinkConfig {
    pub fn new(brokers: Vec<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers,
            topic: topic.into(),
            partition: 0,
            buffer: default_buffer(),
            close_timeout_ms: default_close_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_max_wait_ms() -> i32 {
    500
}
fn default_max_bytes() -> i32 {
    1024 * 1024
}
fn default_buffer() -> usize {
    1024
}
fn default_close_timeout_ms() -> u64 {
    5000
}
fn default_connect_timeout_ms() -> u64 {
    5000
}

// ═══════════════════════════════════════════════════════════════
//  Connect
// ═══════════════════════════════════════════════════════════════

pub(crate) fn broker_error(context: &str, e: impl std::fmt::Display) -> BrokerError {
    BrokerError::Rejected(format!("kafka {context}: {e}"))
}

/// Клиент партиции; bootstrap и metadata укладываются в `timeout`.
pub(crate) async fn connect_partition(
    brokers: &[String],
    topic: &str,
    partition: i32,
    timeout: Duration,
) -> Result<Arc<PartitionClient>, BrokerError> {
    if brokers.is_empty() {
        return Err(BrokerError::Rejected("kafka: no brokers configured".into()));
    }

    let connect = async {
        let client = ClientBuilder::new(brokers.to_vec())
            .build()
            .await
            .map_err(|e| broker_error("connect", e))?;
        client
            .partition_client(topic.to_string(), partition, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| broker_error("partition", e))
    };

    let partition_client = tokio::time::timeout(timeout, connect).await.map_err(|_| {
        BrokerError::Rejected(format!(
            "kafka: brokers {} not reachable within {} ms",
            brokers.join(","),
            timeout.as_millis()
        ))
    })??;

    tracing::info!(brokers = %brokers.join(","), topic, partition, "kafka partition client ready");
    Ok(Arc::new(partition_client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_config_defaults() {
        let cfg: KafkaSourceConfig =
            serde_json::from_str(r#"{"brokers": ["kafka:9092"], "topic": "hawkv6.telemetry.unprocessed"}"#).unwrap();
        assert_eq!(cfg.partition, 0);
        assert_eq!(cfg.max_wait_ms, 500);
        assert_eq!(cfg.max_bytes, 1024 * 1024);
        assert_eq!(cfg.connect_timeout_ms, 5000);
    }

    #[test]
    fn sink_config_defaults() {
        let cfg: KafkaSinkConfig =
            serde_json::from_str(r#"{"brokers": ["kafka:9092"], "topic": "hawkv6.telemetry.processed", "buffer": 8}"#)
                .unwrap();
        assert_eq!(cfg.buffer, 8);
        assert_eq!(cfg.close_timeout_ms, 5000);
    }

    #[tokio::test]
    async fn no_brokers_is_rejected() {
        let result = connect_partition(&[], "t", 0, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(BrokerError::Rejected(_))));
    }

    #[tokio::test]
    async fn unreachable_broker_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let started = tokio::time::Instant::now();
        let result = connect_partition(&[addr], "t", 0, Duration::from_millis(200)).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
