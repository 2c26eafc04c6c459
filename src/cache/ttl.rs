use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::MemoryCacheSettings;

/// Count-bounded LRU whose entries expire `ttl` after insertion.
///
/// A capacity of zero disables caching: every lookup computes.
pub struct TtlCache<K: Hash + Eq, V> {
    entries: Option<Mutex<LruCache<K, (Instant, V)>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Holds at most `capacity` entries for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            ttl,
        }
    }

    /// Cache sized from settings.
    pub fn from_settings(settings: &MemoryCacheSettings) -> Self {
        Self::new(settings.max_size, settings.ttl())
    }

    /// Returns a live cached value.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Returns the live cached value or computes and stores it. Errors are
    /// not cached.
    pub fn get_or_try_insert_with<E, F>(&self, key: &K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.get_or_try_insert_with_at(key, Instant::now(), compute)
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries.as_ref()?.lock();
        match entries.get(key) {
            Some((stored_at, value)) if now.saturating_duration_since(*stored_at) < self.ttl => {
                Some(value.clone())
            }
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub(crate) fn get_or_try_insert_with_at<E, F>(
        &self,
        key: &K,
        now: Instant,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get_at(key, now) {
            return Ok(value);
        }
        let value = compute()?;
        if let Some(entries) = &self.entries {
            entries.lock().put(key.clone(), (now, value.clone()));
        }
        Ok(value)
    }
}
