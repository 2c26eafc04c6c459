//! Runtime settings.
//!
//! Settings are read from a TOML file (explicit path, or
//! `<config dir>/circuitview/config.toml` when it exists) and then overridden by
//! environment variables using the historical variable names.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logging configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Emit one JSON object per event instead of human readable lines.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Disk artifact cache configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitCacheSettings {
    /// Root directory holding one sub-directory per cached key.
    pub path: PathBuf,
    /// Aggregate size bound of the in-memory index, in MiB.
    pub max_size_mb: u64,
    /// Maximum time a reader waits for the ready sentinel, in seconds.
    pub check_timeout: f64,
    /// Polling interval of waiting readers, in seconds.
    pub check_interval: f64,
    /// Largest sampling ratio served from the cache.
    pub cached_sampling_ratio: f64,
}

impl CircuitCacheSettings {
    /// Size bound in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    /// Reader timeout as a [`Duration`].
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.check_timeout.max(0.0))
    }

    /// Reader polling interval as a [`Duration`].
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.check_interval.max(0.0))
    }
}

impl Default for CircuitCacheSettings {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            max_size_mb: 400,
            check_timeout: 600.0,
            check_interval: 1.0,
            cached_sampling_ratio: 0.01,
        }
    }
}

/// Bounds of one in-memory metadata cache.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryCacheSettings {
    /// Maximum number of entries.
    pub max_size: usize,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
}

impl MemoryCacheSettings {
    /// Entry lifetime as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for MemoryCacheSettings {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl_secs: 24 * 3600,
        }
    }
}

/// Bundled region data used when no remote region map is available.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RegionSettings {
    /// Region hierarchy JSON file.
    pub hierarchy: Option<PathBuf>,
    /// JSON-LD ontology providing the alternate region ids.
    pub alternate_map: Option<PathBuf>,
}

/// Full runtime configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Logging.
    pub log: LogSettings,
    /// Disk artifact cache and its index.
    pub circuit_cache: CircuitCacheSettings,
    /// Remote entity cache.
    pub entity_cache: MemoryCacheSettings,
    /// Remote region hierarchy cache.
    pub region_map_cache: MemoryCacheSettings,
    /// Remote alternate region map cache.
    pub alternate_region_map_cache: MemoryCacheSettings,
    /// Bundled region data.
    pub regions: RegionSettings,
    /// Known circuit ids and their config paths.
    pub circuits: BTreeMap<String, PathBuf>,
    /// Required read permissions per endpoint, then per bucket.
    pub read_permissions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl Default for Settings {
    fn default() -> Self {
        let small = MemoryCacheSettings {
            max_size: 10,
            ..MemoryCacheSettings::default()
        };
        Self {
            log: LogSettings::default(),
            circuit_cache: CircuitCacheSettings::default(),
            entity_cache: MemoryCacheSettings::default(),
            region_map_cache: small,
            alternate_region_map_cache: small,
            regions: RegionSettings::default(),
            circuits: BTreeMap::new(),
            read_permissions: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Loads the settings file (if any) and applies process environment overrides.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path),
            None => default_config_path().filter(|path| path.exists()),
        };
        let mut settings = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses a TOML settings file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache = &mut self.circuit_cache;
        if let Some(path) = lookup("CIRCUIT_CACHE_PATH") {
            cache.path = PathBuf::from(path);
        }
        override_parsed(&lookup, "CIRCUIT_CACHE_MAX_SIZE_MB", &mut cache.max_size_mb)?;
        override_parsed(&lookup, "CIRCUIT_CACHE_CHECK_TIMEOUT", &mut cache.check_timeout)?;
        override_parsed(&lookup, "CIRCUIT_CACHE_CHECK_INTERVAL", &mut cache.check_interval)?;
        override_parsed(&lookup, "CACHED_SAMPLING_RATIO", &mut cache.cached_sampling_ratio)?;
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log.level = level.to_lowercase();
        }
        override_parsed(&lookup, "LOG_SERIALIZE", &mut self.log.json)?;
        for (prefix, section) in [
            ("ENTITY_CACHE", &mut self.entity_cache),
            ("REGION_MAP_CACHE", &mut self.region_map_cache),
            ("ALTERNATIVE_REGION_MAP_CACHE", &mut self.alternate_region_map_cache),
        ] {
            override_parsed(&lookup, &format!("{prefix}_MAX_SIZE"), &mut section.max_size)?;
            override_parsed(&lookup, &format!("{prefix}_TTL"), &mut section.ttl_secs)?;
        }
        Ok(())
    }

    /// Rejects values that would make the caches misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cache = &self.circuit_cache;
        if !(cache.check_interval.is_finite() && cache.check_interval > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "circuit_cache.check_interval must be positive, got {}",
                cache.check_interval
            )));
        }
        if !(cache.check_timeout.is_finite() && cache.check_timeout >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "circuit_cache.check_timeout must not be negative, got {}",
                cache.check_timeout
            )));
        }
        if !(cache.cached_sampling_ratio > 0.0 && cache.cached_sampling_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "circuit_cache.cached_sampling_ratio must be in (0, 1], got {}",
                cache.cached_sampling_ratio
            )));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, name: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(name) {
        *target = raw.trim().to_lowercase().parse().map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

/// Errors raised while loading [`Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnv { name: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Location of the user level settings file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("circuitview").join("config.toml"))
}

/// Default disk cache root, under the system temporary directory.
pub fn default_cache_path() -> PathBuf {
    std::env::temp_dir().join("circuitview").join("circuits")
}
