//! Circuit operations behind one explicitly constructed facade.
//!
//! [`CircuitService`] owns the sampled circuit cache, the optional remote
//! metadata cache and the bundled region data. Nothing is global: build one
//! service and share it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::{sample_nodes, SampledCircuitWriter};
use crate::cache::{CacheKey, CacheStats, SampledCircuitCache};
use crate::config::Settings;
use crate::error::{CircuitError, Result};
use crate::population::{Circuit, Column, IdMapping, NodePopulation, Query, QueryValue, Scalar};
use crate::query::sampling::check_ratio;
use crate::query::{select, NodeTable, QueryOptions};
use crate::region::{self, AlternateRegionMap, RegionHierarchy};
use crate::remote::{self, MetadataCache, MetadataClient, RemoteContext};

/// Query key expanded through the region resolver.
pub const REGION_ATTRIBUTE: &str = "region";

/// A circuit named by external id, by config path, or both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CircuitRef {
    /// External id, resolved through the local registry or remote metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Config path; takes precedence over `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl CircuitRef {
    /// Reference by id.
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            path: None,
        }
    }

    /// Reference by config path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            id: None,
            path: Some(path.into()),
        }
    }
}

/// Everything an export needs once the circuit has been resolved.
#[derive(Clone, Debug)]
pub struct CircuitParams {
    /// Circuit, population, attributes and sampling to query.
    pub key: CacheKey,
    /// Hierarchy used to expand region predicates.
    pub hierarchy: Arc<RegionHierarchy>,
    /// Fallback region ids.
    pub alternate: Arc<AlternateRegionMap>,
    /// The key points at a sampled circuit whose ids were renumbered.
    pub reindexed: bool,
}

/// Per-population payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Populations<T> {
    /// Values by population name.
    pub populations: BTreeMap<String, T>,
}

impl<T> Default for Populations<T> {
    fn default() -> Self {
        Self {
            populations: BTreeMap::new(),
        }
    }
}

/// Size of one population.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PopulationSize {
    /// Number of nodes.
    pub size: usize,
}

/// Node counts of a circuit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeCounts {
    /// Node populations.
    pub nodes: Populations<PopulationSize>,
}

/// Node set names of a circuit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeSetNames {
    /// Sorted names.
    pub node_sets: Vec<String>,
}

/// Circuit operations.
pub struct CircuitService {
    settings: Settings,
    cache: SampledCircuitCache,
    metadata: Option<MetadataCache>,
    hierarchy: Arc<RegionHierarchy>,
    alternate: Arc<AlternateRegionMap>,
}

impl CircuitService {
    /// Builds the service, loading the bundled region files named in
    /// `settings`. Missing entries yield empty region data.
    pub fn new(settings: Settings) -> Result<Self> {
        let hierarchy = match &settings.regions.hierarchy {
            Some(path) => RegionHierarchy::load_json(path)?,
            None => RegionHierarchy::default(),
        };
        let alternate = match &settings.regions.alternate_map {
            Some(path) => AlternateRegionMap::load_json(path)?,
            None => AlternateRegionMap::default(),
        };
        let cache =
            SampledCircuitCache::from_settings(&settings.circuit_cache, Arc::new(SampledCircuitWriter));
        Ok(Self {
            settings,
            cache,
            metadata: None,
            hierarchy: Arc::new(hierarchy),
            alternate: Arc::new(alternate),
        })
    }

    /// Resolves unknown circuit ids and region data through `client`.
    pub fn with_metadata_client(mut self, client: Arc<dyn MetadataClient>) -> Self {
        self.metadata = Some(MetadataCache::new(client, &self.settings));
        self
    }

    /// Replaces the bundled region data.
    pub fn with_region_maps(mut self, hierarchy: RegionHierarchy, alternate: AlternateRegionMap) -> Self {
        self.hierarchy = Arc::new(hierarchy);
        self.alternate = Arc::new(alternate);
        self
    }

    /// Active settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Counters of the sampled circuit index.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Status code for a read request on the context's bucket.
    pub fn authorize(&self, ctx: &RemoteContext) -> Result<u16> {
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| CircuitError::invalid("No metadata client configured"))?;
        Ok(remote::authorize(
            ctx,
            metadata.client(),
            &self.settings.read_permissions,
        ))
    }

    /// Config path of a circuit: explicit path, local registry, then remote
    /// metadata.
    pub fn circuit_config_path(
        &self,
        circuit: &CircuitRef,
        ctx: Option<&RemoteContext>,
    ) -> Result<PathBuf> {
        if let Some(path) = &circuit.path {
            return Ok(path.clone());
        }
        let id = circuit
            .id
            .as_deref()
            .ok_or_else(|| CircuitError::invalid("Either the circuit id or path must be set"))?;
        if let Some(path) = self.settings.circuits.get(id) {
            return Ok(path.clone());
        }
        match (&self.metadata, ctx) {
            (Some(metadata), Some(ctx)) => {
                let entity = metadata.entity(Some(id), ctx)?;
                remote::circuit_config_path(&entity)
            }
            _ => Err(CircuitError::CircuitIdNotFound(id.to_string())),
        }
    }

    /// Region data for a circuit.
    ///
    /// Circuits resolved remotely use the hierarchy and ontology their entity
    /// references; everything else uses the bundled data.
    pub fn region_maps(
        &self,
        circuit: &CircuitRef,
        ctx: Option<&RemoteContext>,
    ) -> Result<(Arc<RegionHierarchy>, Arc<AlternateRegionMap>)> {
        let mut hierarchy = Arc::clone(&self.hierarchy);
        let mut alternate = Arc::clone(&self.alternate);
        let remote_id = circuit
            .id
            .as_deref()
            .filter(|id| circuit.path.is_none() && !self.settings.circuits.contains_key(*id));
        if let (Some(metadata), Some(ctx), Some(id)) = (&self.metadata, ctx, remote_id) {
            let entity = metadata.entity(Some(id), ctx)?;
            if let Some(atlas) = entity.parcellation_ontology.as_deref() {
                let atlas = metadata.entity(Some(atlas), ctx)?;
                hierarchy = metadata.region_hierarchy(&atlas, ctx)?;
            }
            if let Some(ontology) = entity.brain_region_ontology.as_deref() {
                let ontology = metadata.entity(Some(ontology), ctx)?;
                alternate = metadata.alternate_region_map(&ontology, ctx)?;
            }
        }
        Ok((hierarchy, alternate))
    }

    /// Name of the only node population of a circuit.
    pub fn single_population_name(
        &self,
        circuit: &CircuitRef,
        ctx: Option<&RemoteContext>,
    ) -> Result<String> {
        let path = self.circuit_config_path(circuit, ctx)?;
        Circuit::open(&path)?.single_population_name()
    }

    /// Resolves the circuit and, when allowed, swaps it for a cached sample.
    ///
    /// The cache is used only with `use_cache` and a ratio not above the
    /// cached ratio. The sample is taken at the cached ratio, then queried at
    /// `sampling_ratio / cached_ratio` so the overall fraction is preserved.
    #[allow(clippy::too_many_arguments)]
    pub fn circuit_params(
        &self,
        circuit: &CircuitRef,
        ctx: Option<&RemoteContext>,
        population_name: Option<&str>,
        attributes: Vec<String>,
        sampling_ratio: f64,
        seed: u64,
        use_cache: bool,
    ) -> Result<CircuitParams> {
        check_ratio(sampling_ratio)?;
        let path = self.circuit_config_path(circuit, ctx)?;
        let population_name = match population_name {
            Some(name) => name.to_string(),
            None => Circuit::open(&path)?.single_population_name()?,
        };
        let (hierarchy, alternate) = self.region_maps(circuit, ctx)?;
        let mut key = CacheKey::new(path, population_name, attributes, sampling_ratio, seed);
        if let Some(id) = &circuit.id {
            key = key.with_circuit_id(id.clone());
        }
        let cached_ratio = self.settings.circuit_cache.cached_sampling_ratio;
        let mut reindexed = false;
        if !use_cache || sampling_ratio > cached_ratio || cached_ratio <= 0.0 {
            warn!(
                sampling_ratio,
                cached_ratio, use_cache, "not caching nor using the sampled circuit"
            );
        } else {
            let paths = self.cache.get(&key.clone().with_sampling_ratio(cached_ratio))?;
            key = key
                .with_circuit_config_path(paths.circuit_config())
                .with_sampling_ratio(sampling_ratio / cached_ratio);
            reindexed = true;
        }
        Ok(CircuitParams {
            key,
            hierarchy,
            alternate,
            reindexed,
        })
    }

    /// Runs the queries against the circuit described by `params`.
    ///
    /// Region predicates are expanded to acronyms first. Rows keep the
    /// partition order of the queries and are renumbered from zero.
    pub fn export(
        &self,
        params: &CircuitParams,
        queries: &[Query],
        node_set: Option<&str>,
    ) -> Result<NodeTable> {
        let queries = queries
            .iter()
            .map(|query| expand_regions(query, &params.hierarchy, &params.alternate))
            .collect::<Result<Vec<_>>>()?;
        let key = &params.key;
        let circuit = Circuit::open(key.circuit_config_path())?;
        let population = circuit.node_population(key.population_name())?;
        let node_sets = match node_set {
            Some(_) => Some(circuit.node_sets()?),
            None => None,
        };
        let options = QueryOptions {
            queries,
            attributes: (!key.attributes().is_empty()).then(|| key.attributes().to_vec()),
            node_set: node_set.map(str::to_string),
            sampling_ratio: key.sampling_ratio(),
            seed: key.seed(),
            sort: false,
            include_ids: false,
            reindexed: params.reindexed,
            ..QueryOptions::default()
        };
        let table = select(population.as_ref(), node_sets.as_ref(), &options)?;
        info!(rows = table.len(), population = key.population_name(), "exported nodes");
        Ok(table)
    }

    /// Node count per population.
    pub fn count(&self, path: &Path, population_name: Option<&str>) -> Result<NodeCounts> {
        let mut counts = Populations::default();
        for population in populations(path, population_name)? {
            counts.populations.insert(
                population.name().to_string(),
                PopulationSize {
                    size: population.size(),
                },
            );
        }
        Ok(NodeCounts { nodes: counts })
    }

    /// Exported column names per population.
    pub fn attribute_names(
        &self,
        path: &Path,
        population_name: Option<&str>,
    ) -> Result<Populations<Vec<String>>> {
        let mut names = Populations::default();
        for population in populations(path, population_name)? {
            let table = schema(population.as_ref(), None, true)?;
            let columns = table.column_names().into_iter().map(str::to_string).collect();
            names
                .populations
                .insert(population.name().to_string(), columns);
        }
        Ok(names)
    }

    /// Exported column types per population.
    pub fn attribute_dtypes(
        &self,
        path: &Path,
        population_name: Option<&str>,
    ) -> Result<Populations<BTreeMap<String, String>>> {
        let mut dtypes = Populations::default();
        for population in populations(path, population_name)? {
            let table = schema(population.as_ref(), None, true)?;
            let types = table
                .dtypes()
                .into_iter()
                .map(|(name, dtype)| (name, dtype.to_string()))
                .collect();
            dtypes
                .populations
                .insert(population.name().to_string(), types);
        }
        Ok(dtypes)
    }

    /// Distinct values of the string and categorical attributes per
    /// population. Numeric attributes are skipped.
    pub fn attribute_values(
        &self,
        path: &Path,
        population_name: Option<&str>,
        attributes: Option<&[String]>,
    ) -> Result<Populations<BTreeMap<String, Vec<String>>>> {
        let mut values = Populations::default();
        for population in populations(path, population_name)? {
            let table = schema(population.as_ref(), attributes.map(<[String]>::to_vec), false)?;
            let mut props = BTreeMap::new();
            for (name, column) in table.columns() {
                match column {
                    Column::Category { categories, .. } => {
                        let mut seen = std::collections::BTreeSet::new();
                        let unique = categories
                            .iter()
                            .filter(|value| seen.insert(value.as_str()))
                            .cloned()
                            .collect();
                        props.insert(name.to_string(), unique);
                    }
                    Column::Str(_) => {
                        let options = QueryOptions {
                            attributes: Some(vec![name.to_string()]),
                            sort: false,
                            include_ids: false,
                            enforce_dtypes: false,
                            ..QueryOptions::default()
                        };
                        let full = select(population.as_ref(), None, &options)?;
                        let distinct = full
                            .column(name)
                            .and_then(Column::distinct_strings)
                            .unwrap_or_default();
                        props.insert(name.to_string(), distinct);
                    }
                    _ => {}
                }
            }
            values
                .populations
                .insert(population.name().to_string(), props);
        }
        Ok(values)
    }

    /// Sorted node set names; empty when the node sets cannot be read.
    pub fn node_set_names(&self, path: &Path) -> NodeSetNames {
        let node_sets = Circuit::open(path).and_then(|circuit| circuit.node_sets());
        let node_sets = match node_sets {
            Ok(node_sets) => {
                let mut names = node_sets.names();
                names.sort();
                names
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    %err,
                    "cannot read the node sets, falling back to an empty list"
                );
                Vec::new()
            }
        };
        NodeSetNames { node_sets }
    }

    /// Writes a sampled nodes document for one population.
    #[allow(clippy::too_many_arguments)]
    pub fn sample(
        &self,
        circuit: &CircuitRef,
        ctx: Option<&RemoteContext>,
        output_path: &Path,
        population_name: &str,
        sampling_ratio: f64,
        seed: u64,
        attributes: &[String],
    ) -> Result<IdMapping> {
        let path = self.circuit_config_path(circuit, ctx)?;
        sample_nodes(
            &path,
            output_path,
            population_name,
            sampling_ratio,
            seed,
            attributes,
        )
    }
}

fn populations(path: &Path, population_name: Option<&str>) -> Result<Vec<Box<dyn NodePopulation>>> {
    let circuit = Circuit::open(path)?;
    match population_name {
        Some(name) => circuit.node_populations(Some(&[name.to_string()])),
        None => circuit.node_populations(None),
    }
}

/// Zero-row selection exposing the exported columns and their types.
fn schema(
    population: &dyn NodePopulation,
    attributes: Option<Vec<String>>,
    enforce_dtypes: bool,
) -> Result<NodeTable> {
    let options = QueryOptions {
        attributes,
        sort: false,
        include_ids: false,
        ids: Some(Vec::new()),
        enforce_dtypes,
        ..QueryOptions::default()
    };
    select(population, None, &options)
}

fn expand_regions(
    query: &Query,
    hierarchy: &RegionHierarchy,
    alternate: &AlternateRegionMap,
) -> Result<Query> {
    let Some(regions) = query.get(REGION_ATTRIBUTE) else {
        return Ok(query.clone());
    };
    let tokens: Vec<String> = regions.values().iter().map(Scalar::to_string).collect();
    let acronyms = region::resolve(&tokens, hierarchy, alternate)?;
    let mut expanded = query.clone();
    expanded.insert(
        REGION_ATTRIBUTE.to_string(),
        QueryValue::Many(acronyms.into_iter().map(Scalar::Str).collect()),
    );
    Ok(expanded)
}
