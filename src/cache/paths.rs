use std::path::{Path, PathBuf};

use serde::Serialize;

/// Files of one cache entry directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CachePaths {
    base: PathBuf,
}

impl CachePaths {
    /// Paths below `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Entry directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Partial circuit config pointing at the sampled nodes.
    pub fn circuit_config(&self) -> PathBuf {
        self.base.join("circuit_config.json")
    }

    /// Sampled nodes document.
    pub fn nodes(&self) -> PathBuf {
        self.base.join("nodes.json")
    }

    /// Converted node sets.
    pub fn node_sets(&self) -> PathBuf {
        self.base.join("node_sets.json")
    }

    /// Serialized cache key.
    pub fn metadata(&self) -> PathBuf {
        self.base.join("metadata.json")
    }

    /// Sampled ids per population.
    pub fn id_mapping(&self) -> PathBuf {
        self.base.join("id_mapping.json")
    }

    /// Ready sentinel.
    pub fn ok(&self) -> PathBuf {
        self.base.join("OK")
    }
}
