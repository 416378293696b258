use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::FileStore;

/// Периодически перечитывать store-файл, пока не отменён token.
///
/// Ошибка разбора не сбрасывает текущий документ: pipeline продолжает
/// работать на последнем удачно прочитанном состоянии.
pub fn spawn_watcher(
    store: Arc<FileStore>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let path = store.path().display().to_string();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(%path, interval_ms = interval.as_millis() as u64, "store watcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.reload() {
                        Ok(true) => tracing::info!(%path, "store reloaded"),
                        Ok(false) => {}
                        Err(e) => tracing::warn!(%path, error = %e, "store reload failed, keeping previous document"),
                    }
                }
                _ = token.cancelled() => break,
            }
        }

        tracing::info!(%path, "store watcher finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use linker_api::ConfigStore;

    #[tokio::test]
    async fn watcher_applies_external_changes_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let store = Arc::new(FileStore::open(&path).unwrap());

        let token = CancellationToken::new();
        let handle = spawn_watcher(store.clone(), Duration::from_millis(10), token.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(&path, "clab-name = \"clab-other\"\n").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while store.get_value("clab-name") != "clab-other" {
            assert!(tokio::time::Instant::now() < deadline, "watcher never reloaded");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
