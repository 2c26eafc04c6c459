//! Region name resolution.
//!
//! Region predicates accept numeric ids, acronyms, or ontology terms known only
//! to the alternate map. Every token expands to the acronyms of the region and
//! all of its descendants.

mod alternate;
mod hierarchy;

use std::collections::BTreeSet;

use crate::error::{CircuitError, Result};

pub use alternate::{region_id_to_int, AlternateRegionMap};
pub use hierarchy::RegionHierarchy;

/// Expands region tokens into the set of matching acronyms.
pub fn resolve<S: AsRef<str>>(
    tokens: &[S],
    hierarchy: &RegionHierarchy,
    alternate: &AlternateRegionMap,
) -> Result<BTreeSet<String>> {
    let mut acronyms = BTreeSet::new();
    for token in tokens {
        let token = token.as_ref();
        let mut ids = match token.parse::<i64>() {
            Ok(id) => hierarchy.find_id(id, true),
            Err(_) => hierarchy.find_acronym(token, true),
        };
        if ids.is_empty() {
            if let Some(fallback) = alternate.get(token) {
                ids.extend(fallback.iter().copied());
            }
        }
        if ids.is_empty() {
            return Err(CircuitError::RegionNotFound(token.to_string()));
        }
        for id in ids {
            let acronym = hierarchy
                .acronym(id)
                .ok_or(CircuitError::RegionIdNotFound(id))?;
            acronyms.insert(acronym.to_string());
        }
    }
    Ok(acronyms)
}
