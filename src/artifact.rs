//! Sampled circuit artifacts.
//!
//! A sampled circuit is a self-contained directory: a nodes document holding
//! the sampled records of one population, the node sets rewritten to the new
//! ids, and a partial circuit config pointing at both.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::info;

use crate::cache::{ArtifactWriter, CacheKey, CachePaths};
use crate::error::{CircuitError, Result};
use crate::population::{
    Circuit, CircuitConfig, Column, IdMapping, InMemoryPopulation, NetworksConfig,
    NodeNetworkConfig, NodesDocument, Selection, DYNAMICS_PREFIX,
};
use crate::query::sampling::{check_ratio, sorted_choice_range};

/// Writes the artifacts of a cache entry from the circuit named by its key.
#[derive(Clone, Copy, Debug, Default)]
pub struct SampledCircuitWriter;

impl ArtifactWriter for SampledCircuitWriter {
    fn write(&self, key: &CacheKey, paths: &CachePaths) -> Result<()> {
        let mapping = sample_nodes(
            key.circuit_config_path(),
            &paths.nodes(),
            key.population_name(),
            key.sampling_ratio(),
            key.seed(),
            key.attributes(),
        )?;
        write_id_mapping(&paths.id_mapping(), &mapping)?;
        let node_sets = convert_node_sets(key.circuit_config_path(), &paths.node_sets(), &mapping)?;
        write_circuit_config(
            &paths.circuit_config(),
            node_sets.then(|| paths.node_sets()).as_deref(),
            &paths.nodes(),
            &[key.population_name().to_string()],
        )
    }
}

/// Samples `sampling_ratio` of a population into a nodes document.
///
/// Only `attributes` are kept, all of them when empty; dynamics attributes
/// may be named with or without the `@dynamics:` prefix. Returns the sampled
/// original ids, ascending.
pub fn sample_nodes(
    circuit_config_path: &Path,
    output_path: &Path,
    population_name: &str,
    sampling_ratio: f64,
    seed: u64,
    attributes: &[String],
) -> Result<IdMapping> {
    check_ratio(sampling_ratio)?;
    info!(
        input = %circuit_config_path.display(),
        output = %output_path.display(),
        population = population_name,
        sampling_ratio,
        seed,
        "sampling nodes"
    );
    let circuit = Circuit::open(circuit_config_path)?;
    let source = circuit.node_population(population_name)?;
    let ids = sorted_choice_range(source.size(), sampling_ratio, seed);
    info!(sampled = ids.len(), total = source.size(), "sampled ids");
    let selection = Selection::from_sorted_ids(&ids, source.size());

    let wanted = |names: BTreeSet<String>| -> Vec<String> {
        names
            .into_iter()
            .filter(|name| {
                attributes.is_empty()
                    || attributes.iter().any(|attr| {
                        attr == name || attr.strip_prefix(DYNAMICS_PREFIX) == Some(name.as_str())
                    })
            })
            .collect()
    };

    let enumerations = source.enumeration_names();
    let mut sampled = InMemoryPopulation::new(source.name(), ids.len());
    for name in wanted(enumerations.clone()) {
        let column = Column::Category {
            codes: source.get_enumeration(&name, &selection)?,
            categories: source.enumeration_values(&name)?,
        };
        sampled = sampled.with_attribute(name, column)?;
    }
    let plain = source
        .attribute_names()
        .difference(&enumerations)
        .cloned()
        .collect();
    for name in wanted(plain) {
        let column = source.get_attribute(&name, &selection)?;
        sampled = sampled.with_attribute(name, column)?;
    }
    for name in wanted(source.dynamics_attribute_names()) {
        let column = source.get_dynamics_attribute(&name, &selection)?;
        sampled = sampled.with_dynamics(name, column)?;
    }

    let mut document = NodesDocument::default();
    document
        .populations
        .insert(source.name().to_string(), sampled.to_document());
    document.to_file(output_path)?;

    let mut mapping = IdMapping::new();
    mapping.insert(source.name().to_string(), ids);
    Ok(mapping)
}

/// Rewrites the node sets of a circuit to the sampled ids.
///
/// Returns `false` without writing anything when the circuit has no node
/// sets file.
pub fn convert_node_sets(
    circuit_config_path: &Path,
    output_path: &Path,
    mapping: &IdMapping,
) -> Result<bool> {
    let circuit = Circuit::open(circuit_config_path)?;
    if circuit.node_sets_path().is_none() {
        info!("circuit has no node sets file, skipping conversion");
        return Ok(false);
    }
    circuit.node_sets()?.convert(mapping).to_file(output_path)?;
    Ok(true)
}

/// Writes a partial circuit config exposing `populations` of `nodes_path`.
pub fn write_circuit_config(
    circuit_config_path: &Path,
    node_sets_path: Option<&Path>,
    nodes_path: &Path,
    populations: &[String],
) -> Result<()> {
    let config = CircuitConfig {
        version: Some(json!("2")),
        metadata: [("status".to_string(), json!("partial"))].into(),
        node_sets_file: Some(
            node_sets_path
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
        ),
        networks: NetworksConfig {
            nodes: vec![NodeNetworkConfig {
                nodes_file: nodes_path.display().to_string(),
                populations: populations
                    .iter()
                    .map(|name| (name.clone(), Value::Object(Map::new())))
                    .collect(),
            }],
            edges: Vec::new(),
        },
        ..CircuitConfig::default()
    };
    config.to_file(circuit_config_path)
}

/// Writes sampled ids per population.
pub fn write_id_mapping(path: &Path, mapping: &IdMapping) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, mapping)?;
    writer.flush()?;
    Ok(())
}

/// Reads a file written by [`write_id_mapping`].
pub fn read_id_mapping(path: &Path) -> Result<IdMapping> {
    let file = File::open(path).map_err(|err| {
        CircuitError::circuit(format!(
            "Impossible to read the id mapping {}: {err}",
            path.display()
        ))
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
