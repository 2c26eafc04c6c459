#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use circuitview::config::Settings;
use circuitview::population::{Column, InMemoryPopulation, NodePopulation, NodesDocument};
use tempfile::TempDir;

pub const HIERARCHY: &str = r#"{"msg": [{
    "id": 997, "acronym": "root", "name": "root",
    "children": [
        {"id": 8, "acronym": "grey", "name": "Basic cell groups and regions", "children": [
            {"id": 322, "acronym": "SSp", "name": "Primary somatosensory area", "children": [
                {"id": 1030, "acronym": "SSp-ll1", "name": "layer 1", "children": []},
                {"id": 113, "acronym": "SSp-ll2", "name": "layer 2", "children": []}
            ]}
        ]},
        {"id": 73, "acronym": "VS", "name": "ventricular systems", "children": []}
    ]
}]}"#;

pub const ONTOLOGY: &str = r#"{"defines": [
    {"@id": "http://bbp.epfl.ch/neurosciencegraph/ontologies/core/brainregion/Isocortex_L2",
     "hasLayerLeafRegionPart": ["http://api.brain-map.org/api/v2/data/Structure/113"]}
]}"#;

/// Two-population circuit on disk.
pub struct CircuitFixture {
    pub dir: TempDir,
    /// Config exposing `default` and `default2`.
    pub config: PathBuf,
    /// Config exposing only `default`.
    pub single: PathBuf,
    pub hierarchy: PathBuf,
    pub ontology: PathBuf,
}

impl CircuitFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        let mut nodes = NodesDocument::default();
        for population in [default_population(), default2_population()] {
            nodes
                .populations
                .insert(population.name().to_string(), population.to_document());
        }
        nodes.to_file(&root.join("nodes.json")).expect("nodes");
        fs::write(
            root.join("node_sets.json"),
            r#"{
                "Layer2": {"layer": 2},
                "Population_default": {"population": "default"},
                "Population_default2": {"population": "default2"},
                "Literal": {"population": "default", "node_id": [0, 2]},
                "Union": ["Layer2", "Literal"]
            }"#,
        )
        .expect("node sets");
        let config = write_config(root, "circuit_config.json", &["default", "default2"]);
        let single = write_config(root, "circuit_config_single.json", &["default"]);
        let hierarchy = root.join("hierarchy.json");
        fs::write(&hierarchy, HIERARCHY).expect("hierarchy");
        let ontology = root.join("ontology.jsonld");
        fs::write(&ontology, ONTOLOGY).expect("ontology");
        Self {
            dir,
            config,
            single,
            hierarchy,
            ontology,
        }
    }

    /// Settings pointing at an isolated cache root and the fixture regions.
    pub fn settings(&self, cache_root: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.circuit_cache.path = cache_root.to_path_buf();
        settings.circuit_cache.check_interval = 0.01;
        settings.circuit_cache.check_timeout = 5.0;
        settings.regions.hierarchy = Some(self.hierarchy.clone());
        settings.regions.alternate_map = Some(self.ontology.clone());
        settings
            .circuits
            .insert("circuit-1".to_string(), self.config.clone());
        settings
    }
}

fn write_config(root: &Path, name: &str, populations: &[&str]) -> PathBuf {
    let populations: serde_json::Map<String, serde_json::Value> = populations
        .iter()
        .map(|name| (name.to_string(), serde_json::json!({})))
        .collect();
    let config = serde_json::json!({
        "version": "2",
        "node_sets_file": "node_sets.json",
        "networks": {
            "nodes": [{"nodes_file": "nodes.json", "populations": populations}],
            "edges": []
        }
    });
    let path = root.join(name);
    fs::write(&path, serde_json::to_string_pretty(&config).expect("json")).expect("config");
    path
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Three nodes; node 1 is the `L6_Y` one at (201, 202, 203).
pub fn default_population() -> InMemoryPopulation {
    InMemoryPopulation::new("default", 3)
        .with_attribute("layer", Column::Int64(vec![2, 6, 6]))
        .and_then(|p| {
            p.with_attribute(
                "mtype",
                Column::Category {
                    codes: vec![0, 1, 1],
                    categories: strings(&["L2_X", "L6_Y"]),
                },
            )
        })
        .and_then(|p| {
            p.with_attribute(
                "morphology",
                Column::Str(strings(&["morph-A", "morph-B", "morph-C"])),
            )
        })
        .and_then(|p| {
            p.with_attribute(
                "region",
                Column::Str(strings(&["SSp-ll1", "SSp-ll2", "VS"])),
            )
        })
        .and_then(|p| p.with_attribute("x", Column::Float64(vec![101.0, 201.0, 301.0])))
        .and_then(|p| p.with_attribute("y", Column::Float64(vec![102.0, 202.0, 302.0])))
        .and_then(|p| p.with_attribute("z", Column::Float64(vec![103.0, 203.0, 303.0])))
        .expect("default population")
}

/// Four nodes with a dynamics attribute.
pub fn default2_population() -> InMemoryPopulation {
    InMemoryPopulation::new("default2", 4)
        .with_attribute("layer", Column::Int64(vec![7, 8, 8, 9]))
        .and_then(|p| {
            p.with_attribute(
                "mtype",
                Column::Category {
                    codes: vec![0, 1, 1, 2],
                    categories: strings(&["L7_X", "L8_Y", "L9_Z"]),
                },
            )
        })
        .and_then(|p| {
            p.with_attribute(
                "morphology",
                Column::Str(strings(&["morph-D", "morph-E", "morph-F", "morph-G"])),
            )
        })
        .and_then(|p| p.with_attribute("x", Column::Float64(vec![401.0, 501.0, 601.0, 701.0])))
        .and_then(|p| p.with_attribute("y", Column::Float64(vec![402.0, 502.0, 602.0, 702.0])))
        .and_then(|p| p.with_attribute("z", Column::Float64(vec![403.0, 503.0, 603.0, 703.0])))
        .and_then(|p| {
            p.with_dynamics("holding_current", Column::Float64(vec![1.1, 1.2, 1.3, 1.4]))
        })
        .expect("default2 population")
}
