//! Periodic reclamation of idle digest locks and stale cache entries.

use cairn_cache::BoundedCache;
use rand::Rng;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::lock::DigestLockManager;
use crate::upload::FileStore;

/// What one cleanup cycle removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub locks_reclaimed: usize,
    pub expired_purged: usize,
    pub idle_swept: usize,
}

pub struct CleanupScheduler {
    locks: Arc<DigestLockManager>,
    cache: Arc<BoundedCache>,
    interval: Duration,
    jitter: Duration,
    idle_cutoff: Duration,
    shutdown: CancellationToken,
}

impl CleanupScheduler {
    pub fn new(
        locks: Arc<DigestLockManager>,
        cache: Arc<BoundedCache>,
        interval: Duration,
        jitter: Duration,
        idle_cutoff: Duration,
    ) -> Self {
        Self {
            locks,
            cache,
            interval: interval.max(Duration::from_millis(1)),
            jitter,
            idle_cutoff,
            shutdown: CancellationToken::new(),
        }
    }

    /// Scheduler over a store's lock manager and cache, timed by its configuration.
    pub fn for_store(store: &FileStore) -> Self {
        let config = store.config();
        Self::new(
            store.locks().clone(),
            store.cache().clone(),
            config.cleanup_interval(),
            config.cleanup_jitter(),
            config.cache_idle_cutoff(),
        )
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Start the background loop. The first cycle runs after a random delay of up to
    /// `jitter`, then every `interval`; cycles missed while one was running are skipped.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let initial_delay = self.initial_delay();
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                initial_delay_ms = initial_delay.as_millis() as u64,
                "Cleanup scheduler started"
            );

            tokio::select! {
                _ = tokio::time::sleep(initial_delay) => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Cleanup scheduler stopped before first cycle");
                    return;
                }
            }

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once();
                    }
                    _ = self.shutdown.cancelled() => break,
                }
            }

            tracing::info!("Cleanup scheduler stopped");
        })
    }

    /// One cleanup cycle. A failing step is logged and does not stop the others.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "cycle"))]
    pub fn run_once(&self) -> CleanupReport {
        let report = CleanupReport {
            locks_reclaimed: run_step("reclaim_idle_locks", || self.locks.reclaim_idle()),
            expired_purged: run_step("purge_expired_cache", || self.cache.purge_expired()),
            idle_swept: run_step("sweep_idle_cache", || self.cache.sweep_idle(self.idle_cutoff)),
        };

        tracing::debug!(
            locks_reclaimed = report.locks_reclaimed,
            expired_purged = report.expired_purged,
            idle_swept = report.idle_swept,
            cache_bytes = self.cache.resident_bytes(),
            "Cleanup cycle completed"
        );
        report
    }

    fn initial_delay(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }
}

fn run_step(name: &'static str, step: impl FnOnce() -> usize) -> usize {
    match catch_unwind(AssertUnwindSafe(step)) {
        Ok(count) => count,
        Err(_) => {
            tracing::error!(step = name, "Cleanup step panicked");
            0
        }
    }
}
