//! Filtered, sampled views of node populations of circuit datasets.
//!
//! A request names a circuit, a population, the attributes to return, a set
//! of predicates and a sampling ratio. [`service::CircuitService`] resolves
//! the circuit, optionally swaps it for a cached sample produced by
//! [`artifact::SampledCircuitWriter`], and runs [`query::select`] against it.
//!
//! The sample cache lives on disk ([`cache::DiskCache`]) and is safe to share
//! between processes; an in-memory index ([`cache::SizeBoundedCache`]) keeps
//! its total size bounded and deletes evicted entries.

#![warn(missing_docs)]

pub mod artifact;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod population;
pub mod query;
pub mod region;
pub mod remote;
pub mod service;

pub use error::{CircuitError, ErrorKind, Result};
pub use service::{CircuitParams, CircuitRef, CircuitService};
