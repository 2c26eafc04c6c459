#![allow(missing_docs)]

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Barrier};
use std::thread;
use std::time::Duration;

use circuitview::cache::{CacheKey, CachePaths, DiskCache};
use circuitview::{CircuitError, ErrorKind, Result};
use tempfile::TempDir;

fn key(seed: u64) -> CacheKey {
    CacheKey::new("/circuits/a/circuit_config.json", "default", vec![], 0.5, seed)
}

fn disk(dir: &TempDir) -> DiskCache {
    DiskCache::new(
        dir.path().join("cache"),
        Duration::from_millis(10),
        Duration::from_secs(5),
    )
}

#[test]
fn concurrent_callers_share_a_single_write() {
    let dir = TempDir::new().unwrap();
    let cache = disk(&dir);
    let writes = AtomicUsize::new(0);
    let content = br#"{"populations": {"default": {"size": 3}}}"#;
    let writer = |_: &CacheKey, paths: &CachePaths| -> Result<()> {
        writes.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        fs::write(paths.nodes(), content)?;
        Ok(())
    };
    let workers = 8;
    let barrier = Barrier::new(workers);
    let results: Vec<(CachePaths, Vec<u8>)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| -> Result<(CachePaths, Vec<u8>)> {
                    barrier.wait();
                    let paths = cache.get_or_create(&key(1), &writer)?;
                    let bytes = fs::read(paths.nodes())?;
                    Ok((paths, bytes))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect()
    });
    assert!(results.iter().all(|(_, bytes)| bytes.as_slice() == content));
    let results: Vec<CachePaths> = results.into_iter().map(|(paths, _)| paths).collect();

    assert_eq!(writes.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|paths| paths == &results[0]));
    assert!(results[0].ok().exists());
    assert!(results[0].nodes().exists());
    assert_eq!(CacheKey::from_file(&results[0].metadata()).unwrap(), key(1));
}

#[test]
fn ready_entries_are_not_rewritten() {
    let dir = TempDir::new().unwrap();
    let cache = disk(&dir);
    let writes = AtomicUsize::new(0);
    let writer = |_: &CacheKey, paths: &CachePaths| -> Result<()> {
        writes.fetch_add(1, Ordering::SeqCst);
        fs::write(paths.nodes(), b"{}")?;
        Ok(())
    };
    let first = cache.get_or_create(&key(2), &writer).unwrap();
    let modified = fs::metadata(first.metadata()).unwrap().modified().unwrap();
    thread::sleep(Duration::from_millis(20));
    let second = cache.get_or_create(&key(2), &writer).unwrap();

    assert_eq!(first, second);
    assert_eq!(writes.load(Ordering::SeqCst), 1);
    assert_eq!(
        fs::metadata(second.metadata()).unwrap().modified().unwrap(),
        modified
    );
    assert_ne!(cache.paths_for(&key(3)).unwrap(), first);
}

#[test]
fn readers_fail_when_the_writer_gives_up() {
    let dir = TempDir::new().unwrap();
    let cache = disk(&dir);
    let (started_tx, started_rx) = mpsc::channel();
    let failing = move |_: &CacheKey, _: &CachePaths| -> Result<()> {
        started_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(200));
        Err(CircuitError::Circuit("broken circuit".into()))
    };

    thread::scope(|scope| {
        let writer = scope.spawn(|| cache.get_or_create(&key(4), &failing));
        started_rx.recv().unwrap();
        let err = cache
            .get_or_create(&key(4), &|_: &CacheKey, _: &CachePaths| -> Result<()> { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, CircuitError::CacheRemoved(_)), "{err}");
        assert_eq!(err.kind(), ErrorKind::CacheConsistency);
        assert!(writer.join().unwrap().is_err());
    });
    assert!(!cache.paths_for(&key(4)).unwrap().base().exists());
}

#[test]
fn the_failed_entry_can_be_written_again() {
    let dir = TempDir::new().unwrap();
    let cache = disk(&dir);
    let failing = |_: &CacheKey, _: &CachePaths| -> Result<()> {
        Err(CircuitError::Circuit("broken circuit".into()))
    };
    assert!(cache.get_or_create(&key(5), &failing).is_err());
    let paths = cache
        .get_or_create(&key(5), &|_: &CacheKey, _: &CachePaths| -> Result<()> { Ok(()) })
        .unwrap();
    assert!(paths.ok().exists());
}
