use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{InMemoryPopulation, NodePopulation, NodeSets, NodesDocument};
use crate::error::{CircuitError, Result};

/// Circuit config document.
///
/// Relative paths are resolved against the directory holding the config;
/// `$NAME` prefixes are expanded through `manifest`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct CircuitConfig {
    /// Format version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    /// Path variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub manifest: BTreeMap<String, String>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Node sets file; absent or empty when the circuit has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_sets_file: Option<String>,
    /// Node and edge networks.
    #[serde(default)]
    pub networks: NetworksConfig,
}

impl CircuitConfig {
    /// Writes the config as indented JSON.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Networks section of a circuit config.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct NetworksConfig {
    /// Node files.
    #[serde(default)]
    pub nodes: Vec<NodeNetworkConfig>,
    /// Edge files; carried through untouched.
    #[serde(default)]
    pub edges: Vec<Value>,
}

/// One nodes file and the populations it provides.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct NodeNetworkConfig {
    /// Path of the nodes document.
    pub nodes_file: String,
    /// Populations taken from the file; empty means all of them.
    #[serde(default)]
    pub populations: BTreeMap<String, Value>,
}

/// An opened circuit config.
#[derive(Clone, Debug)]
pub struct Circuit {
    path: PathBuf,
    base_dir: PathBuf,
    config: CircuitConfig,
}

impl Circuit {
    /// Opens a circuit config file.
    pub fn open(path: &Path) -> Result<Self> {
        let config = read_config(path).map_err(|err| {
            CircuitError::circuit(format!("Impossible to load the circuit config [{err}]"))
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            path: path.to_path_buf(),
            base_dir,
            config,
        })
    }

    /// Path the config was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed config.
    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Resolved node sets file, if the circuit declares one.
    pub fn node_sets_path(&self) -> Option<PathBuf> {
        self.config
            .node_sets_file
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| self.resolve(raw))
    }

    /// Loads the node sets file.
    pub fn node_sets(&self) -> Result<NodeSets> {
        let path = self.node_sets_path().ok_or_else(|| {
            CircuitError::circuit(
                "Impossible to retrieve the node sets [no node sets file in the circuit config]",
            )
        })?;
        NodeSets::from_file(&path).map_err(|err| {
            CircuitError::circuit(format!(
                "Impossible to retrieve the node sets [{}: {err}]",
                path.display()
            ))
        })
    }

    /// Sorted names of every node population.
    pub fn population_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for network in &self.config.networks.nodes {
            if network.populations.is_empty() {
                let document = self.load_nodes(network)?;
                names.extend(document.populations.into_keys());
            } else {
                names.extend(network.populations.keys().cloned());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Loads one node population.
    pub fn node_population(&self, name: &str) -> Result<Box<dyn NodePopulation>> {
        for network in &self.config.networks.nodes {
            if !network.populations.is_empty() && !network.populations.contains_key(name) {
                continue;
            }
            let mut document = self.load_nodes(network)?;
            if let Some(doc) = document.populations.remove(name) {
                let population = InMemoryPopulation::from_document(name, doc).map_err(|err| {
                    CircuitError::circuit(format!(
                        "Impossible to retrieve the node population(s) [{err}]"
                    ))
                })?;
                return Ok(Box::new(population));
            }
        }
        Err(CircuitError::PopulationNotFound(name.to_string()))
    }

    /// Loads the named populations, or all of them, sorted by name.
    pub fn node_populations(&self, names: Option<&[String]>) -> Result<Vec<Box<dyn NodePopulation>>> {
        let mut names = match names {
            Some(names) => names.to_vec(),
            None => self.population_names()?,
        };
        names.sort();
        names.dedup();
        names.iter().map(|name| self.node_population(name)).collect()
    }

    /// Name of the only population of the circuit.
    pub fn single_population_name(&self) -> Result<String> {
        let mut names = self.population_names()?;
        if names.len() != 1 {
            return Err(CircuitError::invalid(
                "Exactly one node population must be present in the circuit",
            ));
        }
        Ok(names.remove(0))
    }

    fn load_nodes(&self, network: &NodeNetworkConfig) -> Result<NodesDocument> {
        let path = self.resolve(&network.nodes_file);
        NodesDocument::from_file(&path).map_err(|err| {
            CircuitError::circuit(format!(
                "Impossible to retrieve the node population(s) [{}: {err}]",
                path.display()
            ))
        })
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        let expanded = expand_manifest(raw, &self.config.manifest);
        let path = PathBuf::from(expanded);
        if path.is_absolute() {
            path
        } else {
            self.base_dir.join(path)
        }
    }
}

fn read_config(path: &Path) -> Result<CircuitConfig> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn expand_manifest(raw: &str, manifest: &BTreeMap<String, String>) -> String {
    let Some(rest) = raw.strip_prefix('$') else {
        return raw.to_string();
    };
    let (var, tail) = rest.split_once('/').unwrap_or((rest, ""));
    let base = match manifest.get(&format!("${var}")) {
        Some(value) => expand_manifest(value, manifest),
        None if var == "BASE_DIR" => ".".to_string(),
        None => return raw.to_string(),
    };
    if tail.is_empty() {
        base
    } else {
        format!("{base}/{tail}")
    }
}
