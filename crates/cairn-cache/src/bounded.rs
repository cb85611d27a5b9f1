//! Size-bounded in-memory cache with TTL expiry and priority-aware LRU eviction.
//!
//! All bookkeeping lives behind one mutex: the recency list, the owner index, and the
//! resident byte counter change together or not at all. Every removal goes through
//! `CacheState::remove_entry`, which is idempotent, so the byte counter is decremented
//! exactly once per entry no matter which path (invalidation, expiry, eviction,
//! replacement) gets there first.

use bytes::Bytes;
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{CacheError, CacheResult};
use crate::stats::{CacheCounters, CacheStats};

/// Eviction preference. Lower priorities are evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_bytes: usize,
    pub max_item_bytes: usize,
    /// Entries used more recently than this are never evicted to make room
    pub recency_cutoff: Duration,
    /// Entries idle longer than this are treated as expired
    pub idle_cutoff: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 256 * 1024 * 1024,
            max_item_bytes: 16 * 1024 * 1024,
            recency_cutoff: Duration::from_secs(60),
            idle_cutoff: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Bytes,
    size: usize,
    expires_at: Instant,
    priority: CachePriority,
    last_access: Instant,
    owner: Option<Uuid>,
}

#[derive(Debug)]
struct CacheState {
    entries: LruCache<String, CacheEntry>,
    owners: HashMap<Uuid, HashSet<String>>,
    resident_bytes: usize,
}

impl CacheState {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.resident_bytes -= entry.size;
        if let Some(owner) = entry.owner {
            if let Some(keys) = self.owners.get_mut(&owner) {
                keys.remove(key);
                if keys.is_empty() {
                    self.owners.remove(&owner);
                }
            }
        }
        Some(entry)
    }

    fn keys_where(&self, predicate: impl Fn(&str, &CacheEntry) -> bool) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(key, entry)| predicate(key.as_str(), *entry))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn remove_all(&mut self, keys: Vec<String>) -> usize {
        keys.iter()
            .filter(|key| self.remove_entry(key).is_some())
            .count()
    }
}

pub struct BoundedCache {
    state: Mutex<CacheState>,
    config: CacheConfig,
    counters: CacheCounters,
}

impl BoundedCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                owners: HashMap::new(),
                resident_bytes: 0,
            }),
            config,
            counters: CacheCounters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now >= entry.expires_at || now.duration_since(entry.last_access) >= self.config.idle_cutoff
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut state = self.lock();

        let expired = match state.entries.peek(key) {
            Some(entry) => self.is_expired(entry, now),
            None => {
                self.counters.record_miss();
                return None;
            }
        };

        if expired {
            state.remove_entry(key);
            self.counters.record_expirations(1);
            self.counters.record_miss();
            return None;
        }

        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = now;
                self.counters.record_hit();
                Some(entry.value.clone())
            }
            None => {
                self.counters.record_miss();
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let state = self.lock();
        state
            .entries
            .peek(key)
            .is_some_and(|entry| !self.is_expired(entry, now))
    }

    pub fn set(
        &self,
        key: impl Into<String>,
        value: Bytes,
        ttl: Duration,
        priority: CachePriority,
    ) -> CacheResult<()> {
        self.insert(key.into(), value, ttl, priority, None)
    }

    /// Insert an entry that belongs to a stored file, so `invalidate_file` can find it.
    pub fn set_for_file(
        &self,
        file_id: Uuid,
        key: impl Into<String>,
        value: Bytes,
        ttl: Duration,
        priority: CachePriority,
    ) -> CacheResult<()> {
        self.insert(key.into(), value, ttl, priority, Some(file_id))
    }

    fn insert(
        &self,
        key: String,
        value: Bytes,
        ttl: Duration,
        priority: CachePriority,
        owner: Option<Uuid>,
    ) -> CacheResult<()> {
        let size = value.len();
        let max_item = self.config.max_item_bytes.min(self.config.max_bytes);
        if size > max_item {
            self.counters.record_rejection();
            tracing::debug!(key = %key, size_bytes = size, max_item_bytes = max_item, "Entry too large to cache");
            return Err(CacheError::ItemTooLarge {
                size,
                max: max_item,
            });
        }

        let now = Instant::now();
        let mut state = self.lock();

        // A replaced entry counts as freed space, but stays until the new value is admitted.
        let replaced = state.entries.peek(&key).map_or(0, |entry| entry.size);
        if state.resident_bytes - replaced + size > self.config.max_bytes {
            if let Err(err) = self.make_room(&mut state, &key, size, now) {
                self.counters.record_rejection();
                tracing::debug!(key = %key, size_bytes = size, error = %err, "Cache admission refused");
                return Err(err);
            }
        }

        state.remove_entry(&key);
        state.resident_bytes += size;
        if let Some(owner) = owner {
            state.owners.entry(owner).or_default().insert(key.clone());
        }
        state.entries.put(
            key,
            CacheEntry {
                value,
                size,
                expires_at: now + ttl,
                priority,
                last_access: now,
                owner,
            },
        );

        debug_assert!(state.resident_bytes <= self.config.max_bytes);
        Ok(())
    }

    /// Free room for `size` bytes under `key`: expired entries first, then stale entries
    /// by priority and recency. Nothing beyond the expired entries is evicted unless the
    /// whole request can be satisfied. The entry under `key` is never an eviction
    /// candidate; its bytes are credited to the request instead.
    fn make_room(
        &self,
        state: &mut CacheState,
        key: &str,
        size: usize,
        now: Instant,
    ) -> CacheResult<()> {
        let expired = state.keys_where(|_, entry| self.is_expired(entry, now));
        let purged = state.remove_all(expired);
        self.counters.record_expirations(purged);

        let replaced = state.entries.peek(key).map_or(0, |entry| entry.size);
        let needed =
            (state.resident_bytes - replaced + size).saturating_sub(self.config.max_bytes);
        if needed == 0 {
            return Ok(());
        }

        // iter() runs most- to least-recently used; rank 0 is the least recent.
        let mut candidates: Vec<(CachePriority, usize, String, usize)> = state
            .entries
            .iter()
            .rev()
            .enumerate()
            .filter(|(_, (candidate, entry))| {
                candidate.as_str() != key
                    && now.duration_since(entry.last_access) >= self.config.recency_cutoff
            })
            .map(|(rank, (key, entry))| (entry.priority, rank, key.clone(), entry.size))
            .collect();
        candidates.sort_by_key(|(priority, rank, _, _)| (*priority, *rank));

        let reclaimable: usize = candidates.iter().map(|(_, _, _, size)| size).sum();
        if reclaimable < needed {
            return Err(CacheError::CapacityExceeded {
                needed,
                available: reclaimable,
            });
        }

        let mut freed = 0usize;
        let mut evicted = 0usize;
        for (_, _, key, _) in candidates {
            if freed >= needed {
                break;
            }
            if let Some(entry) = state.remove_entry(&key) {
                freed += entry.size;
                evicted += 1;
            }
        }
        self.counters.record_evictions(evicted);
        tracing::debug!(evicted = evicted, freed_bytes = freed, "Evicted cache entries");
        Ok(())
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove_entry(key).is_some()
    }

    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.lock();
        let keys = state.keys_where(|key, _| key.starts_with(prefix));
        state.remove_all(keys)
    }

    /// Drop every entry owned by `file_id` using the owner index.
    pub fn invalidate_file(&self, file_id: Uuid) -> usize {
        let mut state = self.lock();
        let keys: Vec<String> = state
            .owners
            .get(&file_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        state.remove_all(keys)
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let keys = state.keys_where(|_, entry| self.is_expired(entry, now));
        let removed = state.remove_all(keys);
        self.counters.record_expirations(removed);
        removed
    }

    /// Remove entries that have not been read or written for at least `cutoff`.
    pub fn sweep_idle(&self, cutoff: Duration) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let keys = state.keys_where(|_, entry| now.duration_since(entry.last_access) >= cutoff);
        let removed = state.remove_all(keys);
        self.counters.record_expirations(removed);
        removed
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.owners.clear();
        state.resident_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resident_bytes(&self) -> usize {
        self.lock().resident_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        self.counters
            .snapshot(state.entries.len(), state.resident_bytes, self.config.max_bytes)
    }
}
