//! Per-digest mutual exclusion for the dedup check-then-insert sequence.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive hold on one digest. Released on drop, including when the holding future
/// is cancelled.
pub struct DigestLockGuard {
    digest: String,
    _guard: OwnedMutexGuard<()>,
}

impl DigestLockGuard {
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl std::fmt::Debug for DigestLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestLockGuard")
            .field("digest", &self.digest)
            .finish()
    }
}

/// Lazily created async mutexes keyed by content digest.
///
/// Entries are never removed while a holder or waiter has a handle on them;
/// `reclaim_idle` drops the rest.
#[derive(Default)]
pub struct DigestLockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DigestLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, digest: &str) -> DigestLockGuard {
        // The shard guard must be released before awaiting the mutex.
        let mutex = self
            .locks
            .entry(digest.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        let guard = mutex.lock_owned().await;
        DigestLockGuard {
            digest: digest.to_string(),
            _guard: guard,
        }
    }

    /// Remove entries that nobody holds or waits on. Returns how many were removed.
    pub fn reclaim_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks
            .retain(|_, mutex| Arc::strong_count(mutex) > 1 || mutex.try_lock().is_err());
        let reclaimed = before.saturating_sub(self.locks.len());
        if reclaimed > 0 {
            tracing::debug!(
                reclaimed = reclaimed,
                remaining = self.locks.len(),
                "Reclaimed idle digest locks"
            );
        }
        reclaimed
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
