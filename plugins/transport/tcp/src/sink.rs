use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use linker_api::{BrokerError, RecordSink};

use crate::TcpSinkConfig;

// ═══════════════════════════════════════════════════════════════
//  TcpLineSink: mpsc → writer task → одно соединение к collector'у
// ═══════════════════════════════════════════════════════════════

/// Пишет каждую запись как есть (encoder уже завершает строку `\n`).
///
/// Сокетом владеет фоновая writer-задача; `send` только кладёт запись
/// в канал, поэтому он cancel-safe. При ошибке записи writer
/// переподключается один раз и повторяет.
///
/// Запись, прерванная отменой, не доходит до collector'а обрезанной:
/// соединение сбрасывается (RST), а не закрывается штатно.
pub struct TcpLineSink {
    addr: String,
    tx: Option<mpsc::Sender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    token: CancellationToken,
    close_timeout: Duration,
}

impl TcpLineSink {
    /// Подключиться сразу: недоступный collector: ошибка запуска.
    pub async fn connect(config: &TcpSinkConfig) -> Result<Self, BrokerError> {
        let stream = TcpStream::connect(&config.connect).await?;
        tracing::info!(addr = %config.connect, "tcp sink connected");

        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let token = CancellationToken::new();
        let writer = tokio::spawn(write_loop(stream, config.connect.clone(), rx, token.clone()));

        Ok(Self {
            addr: config.connect.clone(),
            tx: Some(tx),
            writer: Some(writer),
            token,
            close_timeout: Duration::from_millis(config.close_timeout_ms),
        })
    }
}

impl RecordSink for TcpLineSink {
    fn send(&mut self, record: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let tx = self.tx.as_ref().ok_or(BrokerError::Closed)?;
            tx.send(record).await.map_err(|_| BrokerError::Closed)
        })
    }

    /// Дописать очередь и штатно закрыть соединение. Если writer не успел
    /// за `close_timeout`, соединение сбрасывается, остаток очереди теряется.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.tx = None;
            let Some(mut writer) = self.writer.take() else {
                return Ok(());
            };

            let result = match tokio::time::timeout(self.close_timeout, &mut writer).await {
                Ok(_) => Ok(()),
                Err(_) => {
                    tracing::warn!(
                        addr = %self.addr,
                        timeout_ms = self.close_timeout.as_millis() as u64,
                        "tcp sink did not drain in time, resetting connection"
                    );
                    self.token.cancel();
                    let _ = writer.await;
                    Err(BrokerError::Rejected(format!(
                        "collector {} did not accept pending records within {} ms",
                        self.addr,
                        self.close_timeout.as_millis()
                    )))
                }
            };
            tracing::info!(addr = %self.addr, "tcp sink closed");
            result
        })
    }
}

impl Drop for TcpLineSink {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Writer task
// ═══════════════════════════════════════════════════════════════

async fn write_loop(
    stream: TcpStream,
    addr: String,
    mut rx: mpsc::Receiver<Vec<u8>>,
    token: CancellationToken,
) {
    let mut slot = Some(stream);

    'records: loop {
        let record = tokio::select! {
            record = rx.recv() => match record {
                Some(record) => record,
                None => break,
            },
            _ = token.cancelled() => break,
        };

        for attempt in 0..2 {
            match write_once(&mut slot, &addr, &record, &token).await {
                Ok(true) => continue 'records,
                Ok(false) => break 'records,
                Err(e) if attempt == 0 => {
                    tracing::warn!(%addr, error = %e, "send error, reconnecting");
                }
                Err(e) => {
                    tracing::error!(%addr, error = %e, bytes = record.len(), "record lost");
                }
            }
        }
    }

    let Some(mut stream) = slot.take() else {
        return;
    };
    if token.is_cancelled() {
        reset(stream);
        return;
    }
    let finished = tokio::select! {
        finished = async {
            stream.flush().await?;
            stream.shutdown().await
        } => Some(finished),
        _ = token.cancelled() => None,
    };
    match finished {
        Some(Ok(())) => tracing::debug!(%addr, "tcp sink writer finished"),
        Some(Err(e)) => tracing::warn!(%addr, error = %e, "tcp sink shutdown failed"),
        None => reset(stream),
    }
}

/// Одна попытка записи. `Ok(false)`: прервана отменой, соединение сброшено.
/// При ошибке соединение отбрасывается, следующая попытка переподключится.
async fn write_once(
    slot: &mut Option<TcpStream>,
    addr: &str,
    record: &[u8],
    token: &CancellationToken,
) -> Result<bool, BrokerError> {
    if slot.is_none() {
        let stream = tokio::select! {
            stream = TcpStream::connect(addr) => stream?,
            _ = token.cancelled() => return Ok(false),
        };
        tracing::info!(%addr, "tcp sink reconnected");
        *slot = Some(stream);
    }
    let Some(stream) = slot.as_mut() else {
        return Err(BrokerError::Closed);
    };

    let written = tokio::select! {
        written = stream.write_all(record) => Some(written),
        _ = token.cancelled() => None,
    };
    match written {
        Some(Ok(())) => Ok(true),
        Some(Err(e)) => {
            *slot = None;
            Err(e.into())
        }
        None => {
            if let Some(stream) = slot.take() {
                reset(stream);
            }
            Ok(false)
        }
    }
}

/// Закрыть с SO_LINGER=0: peer получает RST, а не FIN после неполной строки.
fn reset(stream: TcpStream) {
    if let Err(e) = stream.set_linger(Some(Duration::ZERO)) {
        tracing::debug!(error = %e, "set_linger failed");
    }
    drop(stream);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn records_reach_collector_and_close_ends_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut sink = TcpLineSink::connect(&TcpSinkConfig::new(addr)).await.unwrap();
        let (mut collector, _) = listener.accept().await.unwrap();

        sink.send(b"isis,host=a f=1 1\n".to_vec()).await.unwrap();
        sink.send(b"isis,host=b f=2 2\n".to_vec()).await.unwrap();
        sink.close().await.unwrap();
        assert!(matches!(sink.send(b"late\n".to_vec()).await, Err(BrokerError::Closed)));

        let mut received = String::new();
        collector.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "isis,host=a f=1 1\nisis,host=b f=2 2\n");
    }

    #[tokio::test]
    async fn cancelled_send_leaves_nothing_half_written() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut sink = TcpLineSink::connect(&TcpSinkConfig::new(addr)).await.unwrap();
        let (mut collector, _) = listener.accept().await.unwrap();

        sink.send(b"isis f=1 1\n".to_vec()).await.unwrap();
        let mut head = vec![0u8; 11];
        collector.read_exact(&mut head).await.unwrap();
        assert_eq!(head, b"isis f=1 1\n");

        // collector не читает: запись застревает в сокете, send при этом не ждёт
        let mut record = vec![b'x'; 16 * 1024 * 1024];
        record.push(b'\n');
        tokio::time::timeout(Duration::from_millis(200), sink.send(record))
            .await
            .expect("send only enqueues")
            .unwrap();

        sink.close_timeout = Duration::from_millis(200);
        assert!(sink.close().await.is_err());

        let mut tail = Vec::new();
        match collector.read_to_end(&mut tail).await {
            Ok(_) => assert!(tail.is_empty() || tail.ends_with(b"\n"), "collector got a cut record and clean EOF"),
            Err(_) => {}
        }
    }

    #[tokio::test]
    async fn unreachable_collector_fails_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(TcpLineSink::connect(&TcpSinkConfig::new(addr)).await.is_err());
    }
}
