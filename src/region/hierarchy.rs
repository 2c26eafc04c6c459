use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CircuitError, Result};

#[derive(Deserialize)]
struct RegionNode {
    id: i64,
    #[serde(default)]
    acronym: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    children: Vec<RegionNode>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HierarchyDocument {
    Wrapped { msg: Vec<RegionNode> },
    Root(RegionNode),
}

/// Region tree indexed by id and acronym.
#[derive(Clone, Debug, Default)]
pub struct RegionHierarchy {
    acronyms: BTreeMap<i64, String>,
    names: BTreeMap<i64, String>,
    children: BTreeMap<i64, Vec<i64>>,
    by_acronym: BTreeMap<String, Vec<i64>>,
}

impl RegionHierarchy {
    /// Parses a nested `{id, acronym, name, children}` document, optionally
    /// wrapped as `{"msg": [root]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let roots = match serde_json::from_str(json)? {
            HierarchyDocument::Wrapped { msg } => msg,
            HierarchyDocument::Root(root) => vec![root],
        };
        let mut hierarchy = Self::default();
        let mut stack: Vec<RegionNode> = roots;
        while let Some(node) = stack.pop() {
            if hierarchy.acronyms.contains_key(&node.id) {
                return Err(CircuitError::circuit(format!(
                    "Duplicate region id in hierarchy: {}",
                    node.id
                )));
            }
            let child_ids = node.children.iter().map(|child| child.id).collect();
            hierarchy.children.insert(node.id, child_ids);
            hierarchy
                .by_acronym
                .entry(node.acronym.clone())
                .or_default()
                .push(node.id);
            hierarchy.acronyms.insert(node.id, node.acronym);
            hierarchy.names.insert(node.id, node.name);
            stack.extend(node.children);
        }
        Ok(hierarchy)
    }

    /// Reads a hierarchy file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.acronyms.len()
    }

    /// True for an empty hierarchy.
    pub fn is_empty(&self) -> bool {
        self.acronyms.is_empty()
    }

    /// Acronym of a region.
    pub fn acronym(&self, id: i64) -> Option<&str> {
        self.acronyms.get(&id).map(String::as_str)
    }

    /// Full name of a region.
    pub fn name(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// The region itself, optionally with every region below it.
    pub fn find_id(&self, id: i64, with_descendants: bool) -> BTreeSet<i64> {
        if !self.acronyms.contains_key(&id) {
            return BTreeSet::new();
        }
        if with_descendants {
            self.descendants(id)
        } else {
            BTreeSet::from([id])
        }
    }

    /// Regions with the given acronym, optionally with their descendants.
    pub fn find_acronym(&self, acronym: &str, with_descendants: bool) -> BTreeSet<i64> {
        let mut found = BTreeSet::new();
        for &id in self.by_acronym.get(acronym).into_iter().flatten() {
            found.extend(self.find_id(id, with_descendants));
        }
        found
    }

    /// A region and all regions below it.
    pub fn descendants(&self, id: i64) -> BTreeSet<i64> {
        let mut found = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if found.insert(current) {
                if let Some(children) = self.children.get(&current) {
                    stack.extend(children.iter().copied());
                }
            }
        }
        found
    }
}
