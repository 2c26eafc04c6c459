//! Sampled circuit caching.
//!
//! Three layers cooperate:
//!
//! * [`DiskCache`]: content-addressed entry directories. Creating the
//!   directory elects the writer; readers poll for the `OK` sentinel.
//! * [`SizeBoundedCache`]: in-process LRU index bounded by the on-disk size
//!   of the entries, deleting evicted directories.
//! * [`TtlCache`]: small count-bounded caches for remote metadata.
//!
//! [`SampledCircuitCache`] ties the first two together.

mod bounded;
mod circuit;
mod disk;
mod key;
mod paths;
mod ttl;

pub use bounded::{CacheStats, SizeBoundedCache};
pub use circuit::SampledCircuitCache;
pub use disk::{directory_size, ArtifactWriter, DiskCache};
pub use key::CacheKey;
pub use paths::CachePaths;
pub use ttl::TtlCache;
