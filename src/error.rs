use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, CircuitError>;

/// Coarse classification of a [`CircuitError`], used by callers to decide how
/// to surface a failure (client error, upstream failure, retry on next request).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A requested attribute, population, node set, region or resource is missing.
    NotFound,
    /// The request itself is malformed or ambiguous.
    InvalidInput,
    /// The underlying dataset could not be read.
    Circuit,
    /// A remote metadata lookup failed.
    Remote,
    /// A disk cache entry vanished or never became ready.
    CacheConsistency,
    /// Local I/O or encoding failure.
    Internal,
}

/// Errors raised while loading, querying, sampling or caching circuits.
#[derive(Debug, Error)]
pub enum CircuitError {
    /// The dataset could not be read or is malformed.
    #[error("{0}")]
    Circuit(String),
    /// Unknown attribute.
    #[error("Attribute not found in population {population}: {attribute}")]
    AttributeNotFound {
        /// Population searched.
        population: String,
        /// Requested attribute.
        attribute: String,
    },
    /// Unknown node population.
    #[error("Population not found: {0}")]
    PopulationNotFound(String),
    /// Unknown node set.
    #[error("Node set not found: {0}")]
    NodeSetNotFound(String),
    /// A region token matched nothing.
    #[error("No region ids found with region '{0}'")]
    RegionNotFound(String),
    /// A resolved region id is missing from the hierarchy.
    #[error("Region ID not found: {0}")]
    RegionIdNotFound(i64),
    /// Circuit id unknown locally and remotely.
    #[error("Circuit id not found: '{0}'")]
    CircuitIdNotFound(String),
    /// Remote resource missing.
    #[error("{0}")]
    ResourceNotFound(String),
    /// Malformed or ambiguous request.
    #[error("{0}")]
    InvalidInput(String),
    /// Remote lookup failure, with the upstream status when known.
    #[error("remote metadata request failed: {message}")]
    Remote {
        /// HTTP status reported upstream.
        status: Option<u16>,
        /// Upstream message.
        message: String,
    },
    /// The awaited cache entry was deleted.
    #[error("The circuit cache has been removed while waiting to read it: {}", .0.display())]
    CacheRemoved(PathBuf),
    /// The awaited cache entry never became ready.
    #[error("Timeout while waiting to read the circuit cache: {}", .0.display())]
    CacheTimeout(PathBuf),
    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Encoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CircuitError {
    pub(crate) fn circuit(message: impl Into<String>) -> Self {
        CircuitError::Circuit(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CircuitError::InvalidInput(message.into())
    }

    pub(crate) fn attribute_not_found(population: &str, attribute: &str) -> Self {
        CircuitError::AttributeNotFound {
            population: population.to_string(),
            attribute: attribute.to_string(),
        }
    }

    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CircuitError::AttributeNotFound { .. }
            | CircuitError::PopulationNotFound(_)
            | CircuitError::NodeSetNotFound(_)
            | CircuitError::RegionNotFound(_)
            | CircuitError::RegionIdNotFound(_)
            | CircuitError::CircuitIdNotFound(_)
            | CircuitError::ResourceNotFound(_) => ErrorKind::NotFound,
            CircuitError::InvalidInput(_) => ErrorKind::InvalidInput,
            CircuitError::Circuit(_) => ErrorKind::Circuit,
            CircuitError::Remote { .. } => ErrorKind::Remote,
            CircuitError::CacheRemoved(_) | CircuitError::CacheTimeout(_) => {
                ErrorKind::CacheConsistency
            }
            CircuitError::Io(_) | CircuitError::Json(_) => ErrorKind::Internal,
        }
    }

    /// True when the failure was caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::InvalidInput | ErrorKind::Circuit
        )
    }

    /// Upstream HTTP status carried by remote failures, if known.
    pub fn status(&self) -> Option<u16> {
        match self {
            CircuitError::Remote { status, .. } => *status,
            _ => None,
        }
    }
}
