use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use linker_api::{BrokerError, RecordSource};

use crate::TcpSourceConfig;
use crate::framing::LineSplitter;

// ═══════════════════════════════════════════════════════════════
//  TcpLineSource: listener → per-connection readers → mpsc
// ═══════════════════════════════════════════════════════════════

/// Принимает producers по TCP; каждая непустая строка: одна запись.
///
/// Чтение идёт в фоновых задачах, `recv` только забирает из канала,
/// поэтому он cancel-safe.
pub struct TcpLineSource {
    local_addr: SocketAddr,
    rx: mpsc::Receiver<Vec<u8>>,
    token: CancellationToken,
}

impl TcpLineSource {
    /// Bind и запуск acceptor'а. Ошибка bind: фатальна для запуска.
    pub async fn bind(config: &TcpSourceConfig) -> Result<Self, BrokerError> {
        let listener = TcpListener::bind(&config.listen).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "tcp source listening");

        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let token = CancellationToken::new();
        tokio::spawn(accept_loop(listener, tx, config.max_line_length, token.clone()));

        Ok(Self { local_addr, rx, token })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl RecordSource for TcpLineSource {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Vec<u8>, BrokerError>>> + Send + '_>> {
        Box::pin(async move { self.rx.recv().await.map(Ok) })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.token.cancel();
            self.rx.close();
            tracing::info!(addr = %self.local_addr, "tcp source closed");
            Ok(())
        })
    }
}

impl Drop for TcpLineSource {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::Sender<Vec<u8>>,
    max_length: usize,
    token: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = token.cancelled() => break,
        };
        match accepted {
            Ok((stream, peer)) => {
                tracing::info!(%peer, "producer connected");
                tokio::spawn(read_connection(stream, peer, tx.clone(), max_length, token.clone()));
            }
            Err(e) => {
                tracing::error!(error = %e, "accept error");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = token.cancelled() => break,
                }
            }
        }
    }
    tracing::debug!("tcp acceptor finished");
}

async fn read_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<Vec<u8>>,
    max_length: usize,
    token: CancellationToken,
) {
    let mut lines = LineSplitter::new(max_length);
    let mut tmp = [0u8; 4096];

    'conn: loop {
        loop {
            match lines.next_line() {
                Ok(Some(line)) => {
                    tokio::select! {
                        sent = tx.send(line) => {
                            if sent.is_err() {
                                break 'conn;
                            }
                        }
                        _ = token.cancelled() => break 'conn,
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "framing error, disconnecting");
                    break 'conn;
                }
            }
        }

        let read = tokio::select! {
            read = stream.read(&mut tmp) => read,
            _ = token.cancelled() => break,
        };
        match read {
            Ok(0) => break,
            Ok(n) => lines.push(&tmp[..n]),
            Err(e) => {
                tracing::warn!(%peer, error = %e, "read error");
                break;
            }
        }
    }
    if lines.pending() > 0 {
        tracing::debug!(%peer, bytes = lines.pending(), "unterminated tail discarded");
    }
    tracing::info!(%peer, "producer disconnected");
}
