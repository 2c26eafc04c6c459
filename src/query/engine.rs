use std::collections::BTreeSet;

use tracing::info;

use super::sampling::{check_ratio, sorted_choice, sorted_choice_range};
use super::table::NodeTable;
use crate::error::{CircuitError, Result};
use crate::population::{
    Column, NodePopulation, NodeSets, Query, Scalar, Selection, DYNAMICS_PREFIX,
};

/// Columns always returned as single precision floats.
pub const FLOAT32_ATTRIBUTES: [&str; 3] = ["x", "y", "z"];
/// Columns always returned as categoricals.
pub const CATEGORY_ATTRIBUTES: [&str; 3] = ["region", "mtype", "layer"];

/// Parameters of one selection.
#[derive(Clone, Debug)]
pub struct QueryOptions {
    /// Ordered queries; each one only sees ids not taken by earlier ones.
    pub queries: Vec<Query>,
    /// Returned columns, or every attribute when `None`.
    pub attributes: Option<Vec<String>>,
    /// Restricts the candidates to a node set.
    pub node_set: Option<String>,
    /// Fraction of candidates kept before filtering.
    pub sampling_ratio: f64,
    /// Sampling seed.
    pub seed: u64,
    /// Sort rows by id when more than one query contributed.
    pub sort: bool,
    /// Keep the ids as index; otherwise the index is `0..len`.
    pub include_ids: bool,
    /// Explicit candidate ids, bypassing node sets and sampling.
    pub ids: Option<Vec<usize>>,
    /// The population was re-sampled, so literal node set ids are meaningless.
    pub reindexed: bool,
    /// Apply the standard column types (see [`ensure_dtypes`]).
    pub enforce_dtypes: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            attributes: None,
            node_set: None,
            sampling_ratio: 1.0,
            seed: 0,
            sort: true,
            include_ids: true,
            ids: None,
            reindexed: false,
            enforce_dtypes: true,
        }
    }
}

/// Runs a selection over `population`.
pub fn select(
    population: &dyn NodePopulation,
    node_sets: Option<&NodeSets>,
    options: &QueryOptions,
) -> Result<NodeTable> {
    let ids = match &options.ids {
        Some(ids) => {
            let unique: BTreeSet<usize> = ids.iter().copied().collect();
            unique.into_iter().collect()
        }
        None => initial_ids(population, node_sets, options)?,
    };
    let attributes = match &options.attributes {
        Some(attributes) => attributes.clone(),
        None => default_attributes(population),
    };
    let resolver = AttributeResolver::new(population);
    let tables = build_tables(&resolver, ids, &options.queries, &attributes)?;
    let mut result = if tables.len() == 1 {
        tables.into_iter().next().unwrap_or_default()
    } else {
        let mut merged = NodeTable::concat(tables)?;
        if options.sort {
            merged.sort_by_index();
        }
        merged
    };
    if !options.include_ids {
        result.reset_index();
    }
    if options.enforce_dtypes {
        ensure_dtypes(&mut result);
    }
    Ok(result)
}

/// Every attribute sorted, followed by every prefixed dynamics attribute sorted.
pub fn default_attributes(population: &dyn NodePopulation) -> Vec<String> {
    let mut attributes: Vec<String> = population.attribute_names().into_iter().collect();
    attributes.extend(
        population
            .dynamics_attribute_names()
            .into_iter()
            .map(|name| format!("{DYNAMICS_PREFIX}{name}")),
    );
    attributes
}

/// Converts the well-known columns to their standard types.
pub fn ensure_dtypes(table: &mut NodeTable) {
    for name in FLOAT32_ATTRIBUTES {
        table.map_column(name, Column::into_float32);
    }
    for name in CATEGORY_ATTRIBUTES {
        table.map_column(name, Column::into_category);
    }
}

fn initial_ids(
    population: &dyn NodePopulation,
    node_sets: Option<&NodeSets>,
    options: &QueryOptions,
) -> Result<Vec<usize>> {
    check_ratio(options.sampling_ratio)?;
    let (ids, full_size) = match &options.node_set {
        Some(name) => {
            let node_sets =
                node_sets.ok_or_else(|| CircuitError::NodeSetNotFound(name.clone()))?;
            if options.reindexed && node_sets.contains_node_ids(name)? {
                return Err(CircuitError::invalid(format!(
                    "Node set {name} lists literal node ids, which are not supported on a sampled circuit"
                )));
            }
            let candidates = node_sets.materialize(name, population)?;
            let full_size = candidates.len();
            (
                sorted_choice(&candidates, options.sampling_ratio, options.seed),
                full_size,
            )
        }
        None => (
            sorted_choice_range(population.size(), options.sampling_ratio, options.seed),
            population.size(),
        ),
    };
    info!(
        population = population.name(),
        node_set = options.node_set.as_deref().unwrap_or("-"),
        selected = ids.len(),
        total = full_size,
        "selected initial ids"
    );
    Ok(ids)
}

fn build_tables(
    resolver: &AttributeResolver<'_>,
    mut ids: Vec<usize>,
    queries: &[Query],
    attributes: &[String],
) -> Result<Vec<NodeTable>> {
    let empty = [Query::new()];
    let queries = if queries.is_empty() { &empty[..] } else { queries };
    let wanted: BTreeSet<&str> = attributes.iter().map(String::as_str).collect();
    let mut tables: Vec<NodeTable> = Vec::with_capacity(queries.len());
    for (num, query) in queries.iter().enumerate() {
        info!("starting filter {}/{}", num + 1, queries.len());
        if let Some(previous) = tables.last() {
            let taken: BTreeSet<usize> = previous.index().iter().copied().collect();
            ids.retain(|id| !taken.contains(id));
        }
        let mut keys: Vec<(&str, &[Scalar])> = query
            .iter()
            .map(|(key, value)| (key.as_str(), value.values()))
            .collect();
        keys.extend(
            attributes
                .iter()
                .filter(|name| !query.contains_key(name.as_str()))
                .map(|name| (name.as_str(), &[][..])),
        );

        let mut current = ids.clone();
        let mut kept: Vec<(String, Column)> = Vec::new();
        for (key, values) in keys {
            let column = resolver.resolve(key, &current)?;
            let column = if values.is_empty() {
                column
            } else {
                let mask = column.matches(values);
                current = current
                    .iter()
                    .zip(&mask)
                    .filter_map(|(&id, &keep)| keep.then_some(id))
                    .collect();
                for (_, previous) in kept.iter_mut() {
                    *previous = previous.filter(&mask);
                }
                column.filter(&mask)
            };
            if wanted.contains(key) {
                kept.push((key.to_string(), column));
            }
            info!(
                key,
                values = values.len(),
                remaining = current.len(),
                "filtered"
            );
        }
        let columns = attributes
            .iter()
            .map(|name| {
                kept.iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, column)| (name.clone(), column.clone()))
                    .ok_or_else(|| CircuitError::attribute_not_found(resolver.name(), name))
            })
            .collect::<Result<Vec<_>>>()?;
        tables.push(NodeTable::new(current, columns)?);
    }
    Ok(tables)
}

/// Looks attributes up as enumeration, plain attribute, then dynamics.
struct AttributeResolver<'a> {
    population: &'a dyn NodePopulation,
    enumerations: BTreeSet<String>,
    attributes: BTreeSet<String>,
    dynamics: BTreeSet<String>,
}

impl<'a> AttributeResolver<'a> {
    fn new(population: &'a dyn NodePopulation) -> Self {
        Self {
            population,
            enumerations: population.enumeration_names(),
            attributes: population.attribute_names(),
            dynamics: population.dynamics_attribute_names(),
        }
    }

    fn name(&self) -> &str {
        self.population.name()
    }

    fn resolve(&self, key: &str, ids: &[usize]) -> Result<Column> {
        let selection = Selection::from_sorted_ids(ids, self.population.size());
        if self.enumerations.contains(key) {
            return Ok(Column::Category {
                codes: self.population.get_enumeration(key, &selection)?,
                categories: self.population.enumeration_values(key)?,
            });
        }
        if self.attributes.contains(key) {
            return self.population.get_attribute(key, &selection);
        }
        if let Some(stripped) = key.strip_prefix(DYNAMICS_PREFIX) {
            if self.dynamics.contains(stripped) {
                return self.population.get_dynamics_attribute(stripped, &selection);
            }
        }
        Err(CircuitError::attribute_not_found(self.name(), key))
    }
}
