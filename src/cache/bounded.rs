use std::hash::Hash;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

/// Counters of a [`SizeBoundedCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to compute the value.
    pub misses: u64,
    /// Entries dropped to respect the size bound.
    pub evictions: u64,
    /// Entries currently held.
    pub entries: usize,
    /// Sum of the sizes of the held entries.
    pub current_size: u64,
    /// Size bound.
    pub max_size: u64,
}

type SizeFn<V> = Box<dyn Fn(&V) -> u64 + Send + Sync>;
type EvictFn<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, (V, u64)>,
    current_size: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// LRU map bounded by the sum of per-entry sizes.
///
/// Sizes are measured once on insert. Evicted entries are handed to the
/// eviction callback before the inserting call returns.
pub struct SizeBoundedCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    max_size: u64,
    size_of: SizeFn<V>,
    on_evict: Option<EvictFn<K, V>>,
}

impl<K, V> SizeBoundedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates an empty cache holding at most `max_size` units.
    pub fn new(max_size: u64, size_of: impl Fn(&V) -> u64 + Send + Sync + 'static) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                current_size: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_size,
            size_of: Box::new(size_of),
            on_evict: None,
        }
    }

    /// Registers the callback run for every evicted entry.
    pub fn with_eviction_callback(mut self, on_evict: impl Fn(&K, &V) + Send + Sync + 'static) -> Self {
        self.on_evict = Some(Box::new(on_evict));
        self
    }

    /// Returns the cached value and marks it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        inner.entries.get(key).map(|(value, _)| value.clone())
    }

    /// True when `key` is cached. Does not touch recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Returns the cached value or computes it.
    ///
    /// The lock is not held while `compute` runs, so concurrent misses may
    /// compute the same key; the first stored value wins and is returned to
    /// every caller.
    pub fn get_or_try_insert_with<E, F>(&self, key: &K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        {
            let mut inner = self.inner.lock();
            if let Some((value, _)) = inner.entries.get(key) {
                let value = value.clone();
                inner.hits += 1;
                return Ok(value);
            }
            inner.misses += 1;
        }
        let value = compute()?;
        Ok(self.insert(key.clone(), value))
    }

    /// Stores `value` unless `key` is already present, evicting least
    /// recently used entries as needed. Returns the value now associated with
    /// `key`, or `value` itself when it exceeds the bound and is not stored.
    pub fn insert(&self, key: K, value: V) -> V {
        let size = (self.size_of)(&value);
        let mut inner = self.inner.lock();
        if let Some((existing, _)) = inner.entries.get(&key) {
            return existing.clone();
        }
        if size > self.max_size {
            warn!(size, max_size = self.max_size, "value too large to be cached");
            return value;
        }
        while inner.current_size + size > self.max_size {
            let Some((evicted_key, (evicted, evicted_size))) = inner.entries.pop_lru() else {
                break;
            };
            inner.current_size -= evicted_size;
            inner.evictions += 1;
            debug!(size = evicted_size, "evicting cache entry");
            if let Some(on_evict) = &self.on_evict {
                on_evict(&evicted_key, &evicted);
            }
        }
        inner.current_size += size;
        inner.entries.put(key, (value.clone(), size));
        value
    }

    /// Drops every entry without running the eviction callback.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.current_size = 0;
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the sizes of the cached entries.
    pub fn current_size(&self) -> u64 {
        self.inner.lock().current_size
    }

    /// Size bound.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            entries: inner.entries.len(),
            current_size: inner.current_size,
            max_size: self.max_size,
        }
    }
}
