use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::cache::key::CacheKey;
use crate::cache::paths::CachePaths;
use crate::config::CircuitCacheSettings;
use crate::error::{CircuitError, Result};

/// Produces the artifacts of a cache entry inside its directory.
///
/// The directory already exists when `write` is called. Metadata and the ready
/// sentinel are written by [`DiskCache`] afterwards.
pub trait ArtifactWriter: Send + Sync {
    /// Writes every artifact for `key` below `paths`.
    fn write(&self, key: &CacheKey, paths: &CachePaths) -> Result<()>;
}

impl<F> ArtifactWriter for F
where
    F: Fn(&CacheKey, &CachePaths) -> Result<()> + Send + Sync,
{
    fn write(&self, key: &CacheKey, paths: &CachePaths) -> Result<()> {
        self(key, paths)
    }
}

/// Content-addressed directories shared between processes.
///
/// Directory creation is the lock: whoever creates `<root>/<checksum>` writes
/// the entry, everybody else waits for its `OK` file.
#[derive(Clone, Debug)]
pub struct DiskCache {
    root: PathBuf,
    check_interval: Duration,
    check_timeout: Duration,
}

impl DiskCache {
    /// Cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, check_interval: Duration, check_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            check_interval,
            check_timeout,
        }
    }

    /// Cache configured from settings.
    pub fn from_settings(settings: &CircuitCacheSettings) -> Self {
        Self::new(
            settings.path.clone(),
            settings.check_interval(),
            settings.check_timeout(),
        )
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry directory of a key, whether or not it exists.
    pub fn paths_for(&self, key: &CacheKey) -> Result<CachePaths> {
        Ok(CachePaths::new(self.root.join(key.checksum()?)))
    }

    /// Returns the ready entry for `key`, writing it first when no other
    /// writer claimed it.
    pub fn get_or_create(&self, key: &CacheKey, writer: &dyn ArtifactWriter) -> Result<CachePaths> {
        let paths = self.paths_for(key)?;
        fs::create_dir_all(&self.root)?;
        match fs::create_dir(paths.base()) {
            Ok(()) => {
                self.write_entry(key, &paths, writer)?;
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && paths.base().is_dir() => {
                self.wait_ready(&paths)?;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(paths)
    }

    fn write_entry(&self, key: &CacheKey, paths: &CachePaths, writer: &dyn ArtifactWriter) -> Result<()> {
        info!(path = %paths.base().display(), "writing cache entry");
        let pending = PendingEntry::new(paths.base());
        writer.write(key, paths)?;
        key.to_file(&paths.metadata())?;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(paths.ok())?;
        pending.commit();
        Ok(())
    }

    fn wait_ready(&self, paths: &CachePaths) -> Result<()> {
        info!(path = %paths.base().display(), "reading cache entry");
        let mut rounds = if self.check_interval.is_zero() {
            0
        } else {
            (self.check_timeout.as_secs_f64() / self.check_interval.as_secs_f64()).floor() as u64
        };
        while !paths.ok().exists() && rounds > 0 {
            debug!(path = %paths.base().display(), rounds, "waiting for cache entry");
            thread::sleep(self.check_interval);
            rounds -= 1;
            if !paths.base().exists() {
                return Err(CircuitError::CacheRemoved(paths.base().to_path_buf()));
            }
        }
        if !paths.ok().exists() {
            return Err(CircuitError::CacheTimeout(paths.base().to_path_buf()));
        }
        Ok(())
    }
}

/// Removes a half-written entry unless committed.
struct PendingEntry<'a> {
    base: &'a Path,
    committed: bool,
}

impl<'a> PendingEntry<'a> {
    fn new(base: &'a Path) -> Self {
        Self {
            base,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        error!(path = %self.base.display(), "failed to write cache entry, removing it");
        if let Err(err) = fs::remove_dir_all(self.base) {
            error!(path = %self.base.display(), %err, "failed to remove cache entry");
        }
    }
}

/// Bytes used by `path` and everything below it, the directories themselves
/// included. Symlinks are counted, never followed.
pub fn directory_size(path: &Path) -> io::Result<u64> {
    let metadata = fs::symlink_metadata(path)?;
    let mut total = metadata.len();
    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            total += directory_size(&entry?.path())?;
        }
    }
    Ok(total)
}
