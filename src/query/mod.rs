#![forbid(unsafe_code)]

//! Query and sampling engine.
//!
//! Turns a list of attribute predicates, an attribute list and a sampling
//! ratio into a deterministic selection of records over a node population.

/// Selection over one population.
///
/// Builds the candidate ids, applies the queries in order and assembles the
/// resulting table.
pub mod engine;

/// Named groups of attributes requested by clients.
pub mod modality;

/// numpy-compatible seeded generator.
pub mod rng;

/// Seeded, sorted sampling of candidate ids.
pub mod sampling;

/// Tabular result of a selection.
pub mod table;

pub use engine::{default_attributes, ensure_dtypes, select, QueryOptions};
pub use modality::Modality;
pub use table::NodeTable;
