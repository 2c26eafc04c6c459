use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{NodePopulation, QueryValue, Selection};
use crate::error::{CircuitError, Result};

const POPULATION_KEY: &str = "population";
const NODE_ID_KEY: &str = "node_id";

/// Sampled ids per population; the position of an id is its new id.
pub type IdMapping = BTreeMap<String, Vec<usize>>;

/// Definition of one node set.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum NodeSetDefinition {
    /// Union of other node sets, by name.
    Compound(Vec<String>),
    /// Rules combined with AND: `population`, `node_id`, or attribute values.
    Basic(BTreeMap<String, Value>),
}

/// A node sets file.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct NodeSets {
    sets: BTreeMap<String, NodeSetDefinition>,
}

impl NodeSets {
    /// Parses a node sets document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a node sets file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Writes a node sets file.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Sorted node set names.
    pub fn names(&self) -> Vec<String> {
        self.sets.keys().cloned().collect()
    }

    /// Definition of a node set.
    pub fn get(&self, name: &str) -> Option<&NodeSetDefinition> {
        self.sets.get(name)
    }

    /// Adds or replaces a node set.
    pub fn insert(&mut self, name: impl Into<String>, definition: NodeSetDefinition) {
        self.sets.insert(name.into(), definition);
    }

    /// Sorted ids of `population` belonging to the node set.
    pub fn materialize(&self, name: &str, population: &dyn NodePopulation) -> Result<Vec<usize>> {
        let mut visiting = Vec::new();
        let ids = self.materialize_set(name, population, &mut visiting)?;
        Ok(ids.into_iter().collect())
    }

    fn materialize_set(
        &self,
        name: &str,
        population: &dyn NodePopulation,
        visiting: &mut Vec<String>,
    ) -> Result<BTreeSet<usize>> {
        let definition = self.definition(name, visiting)?;
        visiting.push(name.to_string());
        let ids = match definition {
            NodeSetDefinition::Compound(names) => {
                let mut ids = BTreeSet::new();
                for child in names {
                    ids.extend(self.materialize_set(child, population, visiting)?);
                }
                ids
            }
            NodeSetDefinition::Basic(rules) => evaluate_rules(name, rules, population)?,
        };
        visiting.pop();
        Ok(ids)
    }

    /// True when the node set, or any node set it references, lists literal ids.
    pub fn contains_node_ids(&self, name: &str) -> Result<bool> {
        let mut visiting = Vec::new();
        self.contains_node_ids_inner(name, &mut visiting)
    }

    fn contains_node_ids_inner(&self, name: &str, visiting: &mut Vec<String>) -> Result<bool> {
        let definition = self.definition(name, visiting)?;
        visiting.push(name.to_string());
        let found = match definition {
            NodeSetDefinition::Compound(names) => {
                let mut found = false;
                for child in names {
                    if self.contains_node_ids_inner(child, visiting)? {
                        found = true;
                        break;
                    }
                }
                found
            }
            NodeSetDefinition::Basic(rules) => rules.contains_key(NODE_ID_KEY),
        };
        visiting.pop();
        Ok(found)
    }

    fn definition(&self, name: &str, visiting: &[String]) -> Result<&NodeSetDefinition> {
        if visiting.iter().any(|seen| seen == name) {
            return Err(CircuitError::circuit(format!(
                "Node set {name} references itself"
            )));
        }
        self.sets
            .get(name)
            .ok_or_else(|| CircuitError::NodeSetNotFound(name.to_string()))
    }

    /// Rewrites literal ids into the id space described by `mapping`.
    ///
    /// Ids missing from the sample are dropped. Node sets whose population was
    /// not sampled lose their literal ids so that they can never return
    /// wrong ids.
    pub fn convert(&self, mapping: &IdMapping) -> NodeSets {
        let mut converted = self.clone();
        for (name, definition) in converted.sets.iter_mut() {
            let NodeSetDefinition::Basic(rules) = definition else {
                continue;
            };
            let Some(old_ids) = rules.get(NODE_ID_KEY) else {
                continue;
            };
            let sampled = rules
                .get(POPULATION_KEY)
                .and_then(Value::as_str)
                .and_then(|population| mapping.get(population));
            let new_ids = match sampled {
                Some(sampled) => {
                    info!(node_set = %name, "converting node set");
                    let old: BTreeSet<u64> = ids_in(old_ids).into_iter().collect();
                    old.into_iter()
                        .filter_map(|id| {
                            usize::try_from(id)
                                .ok()
                                .and_then(|id| sampled.binary_search(&id).ok())
                        })
                        .collect()
                }
                None => Vec::new(),
            };
            rules.insert(NODE_ID_KEY.to_string(), Value::from(new_ids));
        }
        converted
    }
}

fn evaluate_rules(
    name: &str,
    rules: &BTreeMap<String, Value>,
    population: &dyn NodePopulation,
) -> Result<BTreeSet<usize>> {
    if let Some(value) = rules.get(POPULATION_KEY) {
        let names = string_list(name, value)?;
        if !names.iter().any(|n| n == population.name()) {
            return Ok(BTreeSet::new());
        }
    }
    let size = population.size();
    let mut ids: Vec<usize> = match rules.get(NODE_ID_KEY) {
        Some(value) => {
            let wanted: BTreeSet<usize> = ids_in(value)
                .into_iter()
                .filter_map(|id| usize::try_from(id).ok())
                .filter(|&id| id < size)
                .collect();
            wanted.into_iter().collect()
        }
        None => (0..size).collect(),
    };
    for (attribute, value) in rules {
        if attribute == POPULATION_KEY || attribute == NODE_ID_KEY {
            continue;
        }
        let expected: QueryValue = serde_json::from_value(value.clone()).map_err(|_| {
            CircuitError::circuit(format!(
                "Unsupported rule in node set {name}: {attribute}={value}"
            ))
        })?;
        if expected.values().is_empty() {
            return Ok(BTreeSet::new());
        }
        let column = population.get_attribute(attribute, &Selection::from_sorted_ids(&ids, size))?;
        let mask = column.matches(expected.values());
        ids = ids
            .into_iter()
            .zip(mask)
            .filter_map(|(id, keep)| keep.then_some(id))
            .collect();
    }
    Ok(ids.into_iter().collect())
}

fn string_list(name: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    CircuitError::circuit(format!("Invalid population in node set {name}"))
                })
            })
            .collect(),
        _ => Err(CircuitError::circuit(format!(
            "Invalid population in node set {name}"
        ))),
    }
}

fn ids_in(value: &Value) -> Vec<u64> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_u64).collect(),
        other => other.as_u64().into_iter().collect(),
    }
}
