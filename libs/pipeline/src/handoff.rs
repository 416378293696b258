use tokio::sync::{mpsc, oneshot};

// ═══════════════════════════════════════════════════════════════
//  Handoff queue between stages
// ═══════════════════════════════════════════════════════════════

type Slot<T> = (T, Option<oneshot::Sender<()>>);

/// Очередь между двумя стадиями.
///
/// `capacity == 0`: rendezvous. `send` возвращается только когда
/// получатель забрал значение. `capacity > 0`: обычный ограниченный буфер.
pub fn handoff<T>(capacity: usize) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (HandoffSender { tx, rendezvous: capacity == 0 }, HandoffReceiver { rx })
}

/// Получатель закрыт.
#[derive(Debug, PartialEq, Eq)]
pub struct HandoffClosed;

pub struct HandoffSender<T> {
    tx: mpsc::Sender<Slot<T>>,
    rendezvous: bool,
}

impl<T> HandoffSender<T> {
    /// Отмена на ожидании подтверждения оставляет значение в очереди:
    /// получатель всё ещё может его забрать.
    pub async fn send(&self, value: T) -> Result<(), HandoffClosed> {
        if !self.rendezvous {
            return self.tx.send((value, None)).await.map_err(|_| HandoffClosed);
        }
        let (ack, taken) = oneshot::channel();
        self.tx.send((value, Some(ack))).await.map_err(|_| HandoffClosed)?;
        taken.await.map_err(|_| HandoffClosed)
    }
}

pub struct HandoffReceiver<T> {
    rx: mpsc::Receiver<Slot<T>>,
}

impl<T> HandoffReceiver<T> {
    /// Cancel-safe: подтверждение отправляется синхронно после `recv`.
    pub async fn recv(&mut self) -> Option<T> {
        let (value, ack) = self.rx.recv().await?;
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn rendezvous_send_waits_for_receiver() {
        let (tx, mut rx) = handoff::<u32>(0);

        let pending = tokio::time::timeout(Duration::from_millis(50), tx.send(1)).await;
        assert!(pending.is_err(), "send completed without a receiver");

        let sender = tokio::spawn(async move { tx.send(2).await });
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(sender.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn buffered_send_returns_immediately() {
        let (tx, mut rx) = handoff::<u32>(2);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropped_receiver_fails_pending_send() {
        let (tx, rx) = handoff::<u32>(0);
        let sender = tokio::spawn(async move { tx.send(1).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(rx);
        assert_eq!(sender.await.unwrap(), Err(HandoffClosed));
    }
}
