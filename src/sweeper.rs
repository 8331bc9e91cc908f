//! Expiration sweeper (spec §4.F) — periodically expires `pending`/
//! `processing` generation requests that have sat untouched past
//! `REQUEST_EXPIRY_MINUTES`, so an abandoned worker message (dropped past
//! its deadline, never redelivered) doesn't leave a request stuck forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::tracker::RequestTracker;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub struct Sweeper {
    handle: tokio::task::JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl Sweeper {
    pub fn spawn(tracker: Arc<RequestTracker>, request_expiry: chrono::Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                        let horizon = chrono::Utc::now() - request_expiry;
                        match tracker.expire_stale(horizon).await {
                            Ok(expired) if expired > 0 => {
                                tracing::info!(expired, "sweeper expired stale generation requests");
                            }
                            Ok(_) => {}
                            Err(error) => tracing::error!(%error, "sweeper failed to expire stale requests"),
                        }
                    }
                }
            }
        });
        Self { handle, shutdown_tx }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityType;
    use crate::storage::FakeStorage;

    #[tokio::test]
    async fn sweeper_can_be_started_and_stopped_without_panicking() {
        let storage = Arc::new(FakeStorage::new());
        let tracker = Arc::new(RequestTracker::new(storage.clone()));
        tracker
            .create(EntityType::Problem, 1, serde_json::json!({}), serde_json::json!({}))
            .await
            .unwrap();

        let sweeper = Sweeper::spawn(tracker, chrono::Duration::minutes(30));
        sweeper.shutdown().await;
    }
}
