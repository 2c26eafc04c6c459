//! Node population reader capability.
//!
//! The query engine and the artifact writer only see populations through the
//! [`NodePopulation`] trait. [`InMemoryPopulation`] implements it on top of the
//! JSON nodes document, and [`Circuit`] resolves populations and node sets from
//! a circuit config file.

mod circuit;
mod column;
mod memory;
mod node_sets;

use std::collections::BTreeSet;
use std::ops::Range;

use crate::error::{CircuitError, Result};

/// Circuit config loading and population lookup.
pub use circuit::{Circuit, CircuitConfig, NetworksConfig, NodeNetworkConfig};

/// Typed attribute arrays and query values.
pub use column::{Column, Query, QueryValue, Scalar};

/// In-memory population and its on-disk document.
pub use memory::{
    ColumnDocument, EnumerationDocument, InMemoryPopulation, NodesDocument, PopulationDocument,
};

/// Named node set definitions.
pub use node_sets::{IdMapping, NodeSetDefinition, NodeSets};

/// Reserved prefix addressing dynamics attributes in queries and attribute lists.
pub const DYNAMICS_PREFIX: &str = "@dynamics:";

/// A set of node ids inside one population.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// Contiguous, sorted block of ids.
    Range(Range<usize>),
    /// Explicit ids, in output order.
    Ids(Vec<usize>),
}

impl Selection {
    /// Builds a selection from sorted unique ids, using the range form when the
    /// ids cover the whole population.
    pub fn from_sorted_ids(ids: &[usize], population_size: usize) -> Self {
        if !ids.is_empty() && ids.len() == population_size {
            Selection::Range(0..population_size)
        } else {
            Selection::Ids(ids.to_vec())
        }
    }

    /// Number of selected ids.
    pub fn len(&self) -> usize {
        match self {
            Selection::Range(range) => range.len(),
            Selection::Ids(ids) => ids.len(),
        }
    }

    /// True when nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materializes the selected ids.
    pub fn to_ids(&self) -> Vec<usize> {
        match self {
            Selection::Range(range) => range.clone().collect(),
            Selection::Ids(ids) => ids.clone(),
        }
    }

    pub(crate) fn check_bounds(&self, population: &str, size: usize) -> Result<()> {
        let out_of_range = match self {
            Selection::Range(range) => range.end > size,
            Selection::Ids(ids) => ids.iter().any(|&id| id >= size),
        };
        if out_of_range {
            return Err(CircuitError::circuit(format!(
                "Selection out of range for population {population} of size {size}"
            )));
        }
        Ok(())
    }
}

/// Read access to one node population.
pub trait NodePopulation: Send + Sync {
    /// Population name.
    fn name(&self) -> &str;

    /// Number of records.
    fn size(&self) -> usize;

    /// Names of all attributes, enumerations included.
    fn attribute_names(&self) -> BTreeSet<String>;

    /// Names of the dictionary encoded attributes.
    fn enumeration_names(&self) -> BTreeSet<String>;

    /// Names of the dynamics attributes, without [`DYNAMICS_PREFIX`].
    fn dynamics_attribute_names(&self) -> BTreeSet<String>;

    /// Values of an attribute; enumerations are returned decoded.
    fn get_attribute(&self, name: &str, selection: &Selection) -> Result<Column>;

    /// Dictionary codes of an enumeration attribute.
    fn get_enumeration(&self, name: &str, selection: &Selection) -> Result<Vec<u32>>;

    /// Dictionary of an enumeration attribute.
    fn enumeration_values(&self, name: &str) -> Result<Vec<String>>;

    /// Values of a dynamics attribute.
    fn get_dynamics_attribute(&self, name: &str, selection: &Selection) -> Result<Column>;
}
