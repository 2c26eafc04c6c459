#![allow(missing_docs)]

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use circuitview::cache::{
    directory_size, ArtifactWriter, CacheKey, CachePaths, DiskCache, SampledCircuitCache,
};
use circuitview::Result;
use tempfile::TempDir;

fn key(seed: u64) -> CacheKey {
    CacheKey::new("/circuits/a/circuit_config.json", "default", vec![], 0.5, seed)
}

fn writer() -> Arc<dyn ArtifactWriter> {
    Arc::new(|_: &CacheKey, paths: &CachePaths| -> Result<()> {
        fs::write(paths.nodes(), vec![b'n'; 4096])?;
        Ok(())
    })
}

fn cache(dir: &TempDir, max_size: u64) -> SampledCircuitCache {
    let disk = DiskCache::new(
        dir.path().join("cache"),
        Duration::from_millis(10),
        Duration::from_secs(1),
    );
    SampledCircuitCache::new(disk, max_size, writer())
}

/// Size of one entry as measured by the index.
fn entry_size() -> u64 {
    let dir = TempDir::new().unwrap();
    let probe = cache(&dir, u64::MAX);
    let paths = probe.get(&key(9)).unwrap();
    let size = probe.stats().current_size;
    assert_eq!(size, directory_size(paths.base()).unwrap());
    size
}

#[test]
fn least_recently_used_directories_are_deleted() {
    let size = entry_size();
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir, 2 * size + size / 2);

    let first = cache.get(&key(1)).unwrap();
    let second = cache.get(&key(2)).unwrap();
    assert_eq!(cache.get(&key(1)).unwrap(), first);
    let third = cache.get(&key(3)).unwrap();

    assert!(first.base().exists());
    assert!(!second.base().exists());
    assert!(third.ok().exists());
    let stats = cache.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
    assert!(stats.current_size <= stats.max_size);
}

#[test]
fn evicted_entries_are_rebuilt_on_demand() {
    let size = entry_size();
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir, size + size / 2);

    let first = cache.get(&key(1)).unwrap();
    cache.get(&key(2)).unwrap();
    assert!(!first.base().exists());
    let again = cache.get(&key(1)).unwrap();
    assert_eq!(again, first);
    assert!(again.ok().exists());
    assert_eq!(cache.stats().evictions, 2);
}

#[test]
fn oversized_entries_are_served_but_not_indexed() {
    let size = entry_size();
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir, size / 2);

    let paths = cache.get(&key(1)).unwrap();
    assert!(paths.ok().exists());
    let stats = cache.stats();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.current_size, 0);
    assert_eq!(cache.get(&key(1)).unwrap(), paths);
    assert_eq!(cache.stats().misses, 2);
}
