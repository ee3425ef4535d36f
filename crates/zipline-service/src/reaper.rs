use crate::service::LinkService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use zipline_core::{UrlCache, UrlStore};

/// Periodic task that reconciles expired rows to the soft-deleted
/// state and invalidates their cache entries.
///
/// The reaper owns no state of its own; a failed tick is logged and
/// retried on the next one. The interval trades freshness of the Gone
/// response against store scan load.
#[derive(Debug, Clone)]
pub struct Reaper {
    interval: Duration,
}

impl Reaper {
    /// Creates a reaper firing every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Spawns the reaper loop. It stops when `shutdown` flips to true.
    pub fn spawn<S: UrlStore, C: UrlCache>(
        self,
        service: Arc<LinkService<S, C>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick completes immediately; consume it so the
            // initial cleanup happens one full interval after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match service.cleanup_expired().await {
                            Ok(0) => {}
                            Ok(count) => info!(count, "reaper reconciled expired short urls"),
                            Err(e) => error!(error = %e, "reaper cleanup failed"),
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("reaper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
