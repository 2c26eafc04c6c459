use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Identity of a sampled circuit.
///
/// Two keys are equal only when every field matches, attribute order and the
/// exact bit pattern of the ratio included.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CacheKey {
    circuit_config_path: PathBuf,
    population_name: String,
    attributes: Vec<String>,
    sampling_ratio: f64,
    seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    circuit_id: Option<String>,
}

impl CacheKey {
    /// Creates a key without external reference.
    pub fn new(
        circuit_config_path: impl Into<PathBuf>,
        population_name: impl Into<String>,
        attributes: Vec<String>,
        sampling_ratio: f64,
        seed: u64,
    ) -> Self {
        Self {
            circuit_config_path: circuit_config_path.into(),
            population_name: population_name.into(),
            attributes,
            sampling_ratio,
            seed,
            circuit_id: None,
        }
    }

    /// Same key tagged with the id of the circuit it was resolved from.
    pub fn with_circuit_id(mut self, circuit_id: impl Into<String>) -> Self {
        self.circuit_id = Some(circuit_id.into());
        self
    }

    /// Same key with another sampling ratio.
    pub fn with_sampling_ratio(mut self, sampling_ratio: f64) -> Self {
        self.sampling_ratio = sampling_ratio;
        self
    }

    /// Same key pointing at another circuit config.
    pub fn with_circuit_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.circuit_config_path = path.into();
        self
    }

    /// Circuit config file.
    pub fn circuit_config_path(&self) -> &Path {
        &self.circuit_config_path
    }

    /// Node population name.
    pub fn population_name(&self) -> &str {
        &self.population_name
    }

    /// Requested attributes, in order.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Sampling ratio.
    pub fn sampling_ratio(&self) -> f64 {
        self.sampling_ratio
    }

    /// Sampling seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// External reference id, when the circuit was resolved by id.
    pub fn circuit_id(&self) -> Option<&str> {
        self.circuit_id.as_deref()
    }

    /// Compact JSON with fields in declaration order.
    pub fn canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Lowercase hex SHA-256 of [`CacheKey::canonical_json`].
    pub fn checksum(&self) -> Result<String> {
        let digest = Sha256::digest(self.canonical_json()?.as_bytes());
        Ok(hex::encode(digest))
    }

    /// Writes the canonical form to `path`.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.canonical_json()?)?;
        Ok(())
    }

    /// Reads a key written by [`CacheKey::to_file`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.circuit_config_path == other.circuit_config_path
            && self.population_name == other.population_name
            && self.attributes == other.attributes
            && self.sampling_ratio.to_bits() == other.sampling_ratio.to_bits()
            && self.seed == other.seed
            && self.circuit_id == other.circuit_id
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.circuit_config_path.hash(state);
        self.population_name.hash(state);
        self.attributes.hash(state);
        self.sampling_ratio.to_bits().hash(state);
        self.seed.hash(state);
        self.circuit_id.hash(state);
    }
}
