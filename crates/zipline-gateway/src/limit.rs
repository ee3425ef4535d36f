//! Admission control: a global token bucket composed with per-client
//! token buckets behind a swept table.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Outcome of an admission check. The global bucket is consulted first
/// so a hostile client cannot force per-client allocation on the way to
/// a global denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    DeniedGlobal,
    DeniedClient,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Admission tunables.
#[derive(Debug, Clone, TypedBuilder)]
pub struct AdmissionConfig {
    /// Sustained rate of the global bucket, requests per second.
    #[builder(default = 100)]
    pub global_rps: u32,
    /// Sustained rate of each per-client bucket, requests per second.
    #[builder(default = 10)]
    pub per_client_rps: u32,
    /// Burst capacity of both buckets.
    #[builder(default = 20)]
    pub burst_size: u32,
    /// Clients idle longer than this are evicted by the sweeper.
    #[builder(default = Duration::from_secs(600))]
    pub idle_eviction: Duration,
    /// How often the sweeper runs.
    #[builder(default = Duration::from_secs(60))]
    pub sweep_interval: Duration,
}

struct ClientBucket {
    limiter: DirectLimiter,
    /// Milliseconds since the controller's epoch, updated on every
    /// lookup so the sweeper evicts only genuinely idle clients.
    last_access: AtomicU64,
}

impl ClientBucket {
    fn new(quota: Quota, epoch: Instant) -> Self {
        let bucket = Self {
            limiter: RateLimiter::direct(quota),
            last_access: AtomicU64::new(0),
        };
        bucket.touch(epoch);
        bucket
    }

    fn touch(&self, epoch: Instant) {
        self.last_access
            .store(epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }
}

/// Global + per-client token buckets with idle eviction.
///
/// Admission is advisory: the buckets shed load, they do not order it.
/// The hot path takes the read lock; the write lock is taken only to
/// insert a new client (with a double-checked lookup) and by the
/// sweeper.
pub struct AdmissionController {
    global: DirectLimiter,
    clients: RwLock<HashMap<String, Arc<ClientBucket>>>,
    client_quota: Quota,
    idle_eviction: Duration,
    sweep_interval: Duration,
    epoch: Instant,
}

fn quota(rps: u32, burst: u32) -> Quota {
    let rps = NonZeroU32::new(rps.max(1)).expect("clamped to at least 1");
    let burst = NonZeroU32::new(burst.max(1)).expect("clamped to at least 1");
    Quota::per_second(rps).allow_burst(burst)
}

impl AdmissionController {
    /// Creates a controller from its tunables.
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            global: RateLimiter::direct(quota(config.global_rps, config.burst_size)),
            clients: RwLock::new(HashMap::new()),
            client_quota: quota(config.per_client_rps, config.burst_size),
            idle_eviction: config.idle_eviction,
            sweep_interval: config.sweep_interval,
            epoch: Instant::now(),
        }
    }

    /// Checks admission for one request from `client`.
    pub fn allow(&self, client: &str) -> Decision {
        // Global first: a saturated instance denies without touching
        // the per-client table at all.
        if self.global.check().is_err() {
            return Decision::DeniedGlobal;
        }

        if self.bucket_for(client).limiter.check().is_err() {
            return Decision::DeniedClient;
        }

        Decision::Allowed
    }

    /// Blocks until both buckets admit one request from `client`, or
    /// the caller drops the future.
    pub async fn wait(&self, client: &str) {
        self.global.until_ready().await;
        self.bucket_for(client).limiter.until_ready().await;
    }

    /// Number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.clients.read().expect("limiter table poisoned").len()
    }

    /// Evicts clients idle longer than the eviction window. Returns the
    /// number of evicted entries.
    pub fn sweep(&self) -> usize {
        let cutoff = self
            .epoch
            .elapsed()
            .as_millis()
            .saturating_sub(self.idle_eviction.as_millis()) as u64;

        let mut clients = self.clients.write().expect("limiter table poisoned");
        let before = clients.len();
        clients.retain(|_, bucket| bucket.last_access.load(Ordering::Relaxed) >= cutoff);
        before - clients.len()
    }

    /// Spawns the background sweeper. It stops when `shutdown` flips to
    /// true.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(controller.sweep_interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = controller.sweep();
                        if evicted > 0 {
                            debug!(evicted, remaining = controller.client_count(), "swept idle client limiters");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("limiter sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    fn bucket_for(&self, client: &str) -> Arc<ClientBucket> {
        {
            let clients = self.clients.read().expect("limiter table poisoned");
            if let Some(bucket) = clients.get(client) {
                bucket.touch(self.epoch);
                return Arc::clone(bucket);
            }
        }

        let mut clients = self.clients.write().expect("limiter table poisoned");
        // Double-checked: another writer may have inserted between the
        // read unlock and the write lock.
        let bucket = clients
            .entry(client.to_string())
            .or_insert_with(|| Arc::new(ClientBucket::new(self.client_quota, self.epoch)));
        bucket.touch(self.epoch);
        Arc::clone(bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(global_rps: u32, per_client_rps: u32, burst: u32) -> AdmissionController {
        AdmissionController::new(
            AdmissionConfig::builder()
                .global_rps(global_rps)
                .per_client_rps(per_client_rps)
                .burst_size(burst)
                .build(),
        )
    }

    #[test]
    fn burst_is_admitted_then_denied() {
        let controller = controller(10_000, 10, 5);

        for i in 0..5 {
            assert!(controller.allow("10.0.0.1").is_allowed(), "request {i}");
        }

        // Let the fast global bucket refill so the denial is
        // attributable to the client bucket (10 rps refills far slower).
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(controller.allow("10.0.0.1"), Decision::DeniedClient);
    }

    #[test]
    fn clients_are_isolated_until_global_saturates() {
        let controller = controller(10_000, 10, 5);

        // Saturate client A's bucket.
        for _ in 0..5 {
            assert!(controller.allow("10.0.0.1").is_allowed());
        }
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(controller.allow("10.0.0.1"), Decision::DeniedClient);

        // Client B is untouched.
        assert!(controller.allow("10.0.0.2").is_allowed());
    }

    #[test]
    fn global_denial_wins_over_per_client_state() {
        let controller = controller(10, 10_000, 3);

        // Exhaust the global burst from one client...
        for _ in 0..3 {
            assert!(controller.allow("10.0.0.1").is_allowed());
        }
        // ...and a fresh client is denied globally, without a bucket
        // ever being allocated for it.
        assert_eq!(controller.allow("10.0.0.9"), Decision::DeniedGlobal);
        assert_eq!(controller.client_count(), 1);
    }

    #[test]
    fn sweep_evicts_only_idle_clients() {
        let controller = AdmissionController::new(
            AdmissionConfig::builder()
                .global_rps(10_000)
                .per_client_rps(100)
                .burst_size(100)
                .idle_eviction(Duration::from_millis(30))
                .build(),
        );

        controller.allow("10.0.0.1");
        controller.allow("10.0.0.2");
        assert_eq!(controller.client_count(), 2);

        std::thread::sleep(Duration::from_millis(50));
        // Keep one client active across the idle window.
        controller.allow("10.0.0.2");

        assert_eq!(controller.sweep(), 1);
        assert_eq!(controller.client_count(), 1);
    }

    #[test]
    fn sweep_empties_a_fully_idle_table() {
        let controller = AdmissionController::new(
            AdmissionConfig::builder()
                .global_rps(10_000)
                .per_client_rps(100)
                .burst_size(100)
                .idle_eviction(Duration::from_millis(10))
                .build(),
        );

        for i in 0..4 {
            controller.allow(&format!("10.0.0.{i}"));
        }
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(controller.sweep(), 4);
        assert_eq!(controller.client_count(), 0);
    }

    #[tokio::test]
    async fn wait_admits_once_a_token_accrues() {
        let controller = controller(10_000, 50, 1);

        // Drain the single burst cell, then wait for the next token.
        assert!(controller.allow("10.0.0.1").is_allowed());
        controller.wait("10.0.0.1").await;
    }
}
