//! TTL-keyed in-memory cache.
//!
//! Shared building block for the schema resolver's positive/negative tables
//! and the view cache. Each owner constructs its own instance; nothing here
//! is global.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// Wall-clock TTL cache, keyed by string unless told otherwise.
///
/// Expired entries are evicted lazily on read, and swept from `set` whenever
/// the map has grown past its purge mark. The lock is never held across an
/// `.await`.
#[derive(Debug)]
pub struct TtlCache<T, K = String> {
    entries: Mutex<HashMap<K, CacheEntry<T>>>,
    purge_at: AtomicUsize,
}

/// Smallest map size that triggers a sweep from `set`.
pub const PURGE_FLOOR: usize = 256;

impl<T, K> Default for TtlCache<T, K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            purge_at: AtomicUsize::new(PURGE_FLOOR),
        }
    }
}

impl<T: Clone, K: Hash + Eq> TtlCache<T, K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// True if a live entry exists; evicts an expired one.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    pub fn set(&self, key: impl Into<K>, value: T, ttl: Duration) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            expires_at: now + ttl,
        };
        let mut entries = self.lock();
        if entries.len() >= self.purge_at.load(Ordering::Relaxed) {
            entries.retain(|_, e| e.expires_at > now);
            // Next sweep once the live set has doubled.
            self.purge_at
                .store((entries.len() * 2).max(PURGE_FLOOR), Ordering::Relaxed);
        }
        entries.insert(key.into(), entry);
    }

    /// Remove one key. Returns whether an entry (live or expired) was present.
    pub fn invalidate<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().remove(key).is_some()
    }

    /// Remove every key matching the predicate. Returns the count removed.
    pub fn invalidate_where(&self, mut pred: impl FnMut(&K) -> bool) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| !pred(k));
        before - entries.len()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, CacheEntry<T>>> {
        // A panic while holding the lock leaves plain map data behind; keep serving it.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
