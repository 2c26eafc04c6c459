use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{CircuitError, Result};

const STRUCTURE_SEGMENT: &str = "/Structure/";

/// Region tokens that the hierarchy does not know, mapped to hierarchy ids.
///
/// Built from a brain region ontology: every defined term that is not itself a
/// hierarchy structure but lists `hasLayerLeafRegionPart` becomes an entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlternateRegionMap {
    entries: BTreeMap<String, Vec<i64>>,
}

#[derive(Deserialize)]
struct Ontology {
    defines: Vec<OntologyTerm>,
}

#[derive(Deserialize)]
struct OntologyTerm {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "hasLayerLeafRegionPart", default)]
    leaves: Option<Value>,
}

impl AlternateRegionMap {
    /// Parses a JSON-LD ontology document.
    pub fn from_json_ld(json: &str) -> Result<Self> {
        let ontology: Ontology = serde_json::from_str(json)?;
        let mut entries = BTreeMap::new();
        for term in ontology.defines {
            let leaves: Vec<&str> = match &term.leaves {
                Some(Value::String(leaf)) => vec![leaf.as_str()],
                Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            if leaves.is_empty() || region_id_to_int(&term.id).is_ok() {
                continue;
            }
            let ids = leaves
                .into_iter()
                .map(region_id_to_int)
                .collect::<Result<Vec<_>>>()?;
            entries.insert(term.id, ids);
        }
        Ok(Self { entries })
    }

    /// Reads an ontology file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_ld(&json)
    }

    /// Hierarchy ids for a token.
    pub fn get(&self, token: &str) -> Option<&[i64]> {
        self.entries.get(token).map(Vec::as_slice)
    }

    /// Adds an entry.
    pub fn insert(&mut self, token: impl Into<String>, ids: Vec<i64>) {
        self.entries.insert(token.into(), ids);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map has no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extracts the numeric id of a `http(s)://.../Structure/<n>` IRI.
pub fn region_id_to_int(iri: &str) -> Result<i64> {
    let invalid = || CircuitError::invalid(format!("Invalid region id format: {iri}"));
    let (head, tail) = iri.rsplit_once(STRUCTURE_SEGMENT).ok_or_else(invalid)?;
    let scheme_ok = head.starts_with("http://") || head.starts_with("https://");
    if !scheme_ok || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    tail.parse().map_err(|_| invalid())
}
