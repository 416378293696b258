use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use linker_api::{BrokerError, RecordSink, RecordSource};

// ═══════════════════════════════════════════════════════════════
//  In-memory broker
// ═══════════════════════════════════════════════════════════════

/// Входная тема поверх mpsc: producer-сторона отдаётся вызывающему.
pub fn memory_source(capacity: usize) -> (mpsc::Sender<Vec<u8>>, MemorySource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, MemorySource { rx })
}

/// Выходная тема поверх mpsc: consumer-сторона отдаётся вызывающему.
pub fn memory_sink(capacity: usize) -> (MemorySink, mpsc::Receiver<Vec<u8>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MemorySink { tx: Some(tx) }, rx)
}

pub struct MemorySource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl RecordSource for MemorySource {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Vec<u8>, BrokerError>>> + Send + '_>> {
        Box::pin(async move { self.rx.recv().await.map(Ok) })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.rx.close();
            Ok(())
        })
    }
}

pub struct MemorySink {
    tx: Option<mpsc::Sender<Vec<u8>>>,
}

impl RecordSink for MemorySink {
    fn send(&mut self, record: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let tx = self.tx.as_ref().ok_or(BrokerError::Closed)?;
            tx.send(record).await.map_err(|_| BrokerError::Closed)
        })
    }

    /// Отпускает sender: consumer-сторона увидит конец потока.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.tx = None;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_yields_until_producer_drops() {
        let (tx, mut source) = memory_source(4);
        tx.send(b"a".to_vec()).await.unwrap();
        drop(tx);
        assert_eq!(source.recv().await.unwrap().unwrap(), b"a");
        assert!(source.recv().await.is_none());
    }

    #[tokio::test]
    async fn sink_close_ends_stream_and_rejects_sends() {
        let (mut sink, mut rx) = memory_sink(4);
        sink.send(b"x".to_vec()).await.unwrap();
        sink.close().await.unwrap();
        assert!(matches!(sink.send(b"y".to_vec()).await, Err(BrokerError::Closed)));
        assert_eq!(rx.recv().await.unwrap(), b"x");
        assert!(rx.recv().await.is_none());
    }
}
