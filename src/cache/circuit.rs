use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cache::bounded::{CacheStats, SizeBoundedCache};
use crate::cache::disk::{directory_size, ArtifactWriter, DiskCache};
use crate::cache::key::CacheKey;
use crate::cache::paths::CachePaths;
use crate::config::CircuitCacheSettings;
use crate::error::Result;

/// Sampled circuits on disk, indexed in memory under an aggregate size bound.
///
/// Entries evicted from the index have their directory deleted.
pub struct SampledCircuitCache {
    disk: DiskCache,
    index: SizeBoundedCache<CacheKey, CachePaths>,
    writer: Arc<dyn ArtifactWriter>,
}

impl SampledCircuitCache {
    /// Cache over `disk` whose index holds at most `max_size` bytes.
    pub fn new(disk: DiskCache, max_size: u64, writer: Arc<dyn ArtifactWriter>) -> Self {
        let root = disk.root().to_path_buf();
        let index = SizeBoundedCache::new(max_size, move |paths: &CachePaths| {
            entry_size(paths, max_size)
        })
            .with_eviction_callback(move |_: &CacheKey, paths: &CachePaths| {
                remove_evicted(&root, paths.base())
            });
        Self {
            disk,
            index,
            writer,
        }
    }

    /// Cache configured from settings.
    pub fn from_settings(settings: &CircuitCacheSettings, writer: Arc<dyn ArtifactWriter>) -> Self {
        Self::new(
            DiskCache::from_settings(settings),
            settings.max_size_bytes(),
            writer,
        )
    }

    /// Ready artifacts for `key`, produced on first use.
    pub fn get(&self, key: &CacheKey) -> Result<CachePaths> {
        self.index.get_or_try_insert_with(key, || {
            self.disk.get_or_create(key, self.writer.as_ref())
        })
    }

    /// Root directory of the entries.
    pub fn root(&self) -> &Path {
        self.disk.root()
    }

    /// Index counters.
    pub fn stats(&self) -> CacheStats {
        self.index.stats()
    }
}

/// Bytes used by an entry. Unmeasurable entries report more than
/// `max_size`, so they are served but never indexed.
fn entry_size(paths: &CachePaths, max_size: u64) -> u64 {
    match directory_size(paths.base()) {
        Ok(size) => size,
        Err(err) => {
            error!(path = %paths.base().display(), %err, "cannot measure cache entry");
            max_size.saturating_add(1)
        }
    }
}

fn remove_evicted(root: &Path, base: &Path) {
    let (root, path) = match (fs::canonicalize(root), fs::canonicalize(base)) {
        (Ok(root), Ok(path)) => (root, path),
        (_, Err(err)) => {
            info!(path = %base.display(), %err, "evicted cache entry already gone");
            return;
        }
        (Err(err), _) => {
            error!(root = %root.display(), %err, "cannot resolve cache root, keeping evicted entry");
            return;
        }
    };
    if !is_strictly_below(&path, &root) {
        error!(
            path = %path.display(),
            root = %root.display(),
            "refusing to remove evicted entry outside the cache root"
        );
        return;
    }
    info!(path = %path.display(), "removing evicted cache entry");
    if let Err(err) = fs::remove_dir_all(&path) {
        warn!(path = %path.display(), %err, "failed to remove evicted cache entry");
    }
}

fn is_strictly_below(path: &Path, root: &Path) -> bool {
    path != root && path.starts_with(root)
}
