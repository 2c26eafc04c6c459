#![allow(missing_docs)]

mod common;

use std::collections::BTreeMap;

use circuitview::population::{Column, Query, QueryValue};
use circuitview::service::{CircuitRef, CircuitService, NodeSetNames, PopulationSize};
use circuitview::{CircuitError, ErrorKind};
use common::CircuitFixture;
use tempfile::TempDir;

struct Harness {
    fixture: CircuitFixture,
    cache_dir: TempDir,
    service: CircuitService,
}

fn harness(cached_sampling_ratio: f64) -> Harness {
    let fixture = CircuitFixture::new();
    let cache_dir = TempDir::new().unwrap();
    let mut settings = fixture.settings(cache_dir.path());
    settings.circuit_cache.cached_sampling_ratio = cached_sampling_ratio;
    let service = CircuitService::new(settings).unwrap();
    Harness {
        fixture,
        cache_dir,
        service,
    }
}

fn query(key: &str, value: QueryValue) -> Query {
    let mut query = Query::new();
    query.insert(key.to_string(), value);
    query
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn export_by_circuit_id_filters_and_renumbers() {
    let h = harness(0.01);
    let params = h
        .service
        .circuit_params(
            &CircuitRef::from_id("circuit-1"),
            None,
            Some("default2"),
            strings(&["x", "y", "z", "mtype"]),
            1.0,
            0,
            false,
        )
        .unwrap();
    assert!(!params.reindexed);
    assert_eq!(params.key.circuit_config_path(), h.fixture.config.as_path());
    assert_eq!(params.key.circuit_id(), Some("circuit-1"));

    let table = h
        .service
        .export(&params, &[query("mtype", "L8_Y".into())], None)
        .unwrap();
    assert_eq!(table.index(), &[0, 1]);
    assert_eq!(table.column_names(), vec!["x", "y", "z", "mtype"]);
    assert_eq!(
        table.column("x"),
        Some(&Column::Float32(vec![501.0, 601.0]))
    );
    assert_eq!(table.rows()[1][3], serde_json::json!("L8_Y"));
    assert_eq!(h.service.cache_stats().misses, 0);
}

#[test]
fn cached_samples_are_reused_and_reindexed() {
    let h = harness(0.5);
    let circuit = CircuitRef::from_path(&h.fixture.config);
    let params = h
        .service
        .circuit_params(&circuit, None, Some("default"), Vec::new(), 0.5, 102, true)
        .unwrap();
    assert!(params.reindexed);
    assert!(params
        .key
        .circuit_config_path()
        .starts_with(h.cache_dir.path()));
    assert_eq!(params.key.sampling_ratio(), 1.0);

    let table = h.service.export(&params, &[], None).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.column("x"), Some(&Column::Float32(vec![201.0])));
    assert_eq!(
        table.column("mtype").unwrap().value(0),
        serde_json::json!("L6_Y")
    );

    let again = h
        .service
        .circuit_params(&circuit, None, Some("default"), Vec::new(), 0.5, 102, true)
        .unwrap();
    assert_eq!(again.key, params.key);
    let stats = h.service.cache_stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));

    let err = h
        .service
        .export(&params, &[], Some("Literal"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let rows = h
        .service
        .export(&params, &[], Some("Population_default"))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(h
        .service
        .export(&params, &[], Some("Layer2"))
        .unwrap()
        .is_empty());
}

#[test]
fn ratios_above_the_cached_one_bypass_the_cache() {
    let h = harness(0.5);
    let params = h
        .service
        .circuit_params(
            &CircuitRef::from_path(&h.fixture.config),
            None,
            Some("default"),
            Vec::new(),
            0.8,
            0,
            true,
        )
        .unwrap();
    assert!(!params.reindexed);
    assert_eq!(params.key.circuit_config_path(), h.fixture.config.as_path());
    assert_eq!(params.key.sampling_ratio(), 0.8);
    assert_eq!(h.service.cache_stats().misses, 0);
}

#[test]
fn region_predicates_expand_to_descendants() {
    let h = harness(0.01);
    let params = h
        .service
        .circuit_params(
            &CircuitRef::from_path(&h.fixture.single),
            None,
            None,
            strings(&["region"]),
            1.0,
            0,
            false,
        )
        .unwrap();
    assert_eq!(params.key.population_name(), "default");

    let regions = |value: QueryValue| {
        h.service
            .export(&params, &[query("region", value)], None)
            .map(|table| table.rows())
    };
    assert_eq!(
        regions("SSp".into()).unwrap(),
        vec![vec![serde_json::json!("SSp-ll1")], vec![serde_json::json!("SSp-ll2")]]
    );
    assert_eq!(regions(8_i64.into()).unwrap().len(), 2);
    assert_eq!(
        regions(
            "http://bbp.epfl.ch/neurosciencegraph/ontologies/core/brainregion/Isocortex_L2".into()
        )
        .unwrap(),
        vec![vec![serde_json::json!("SSp-ll2")]]
    );
    assert_eq!(regions("VS".into()).unwrap().len(), 1);
    assert!(matches!(
        regions("nowhere".into()),
        Err(CircuitError::RegionNotFound(token)) if token == "nowhere"
    ));
}

#[test]
fn ambiguous_population_requires_a_name() {
    let h = harness(0.01);
    let err = h
        .service
        .circuit_params(
            &CircuitRef::from_id("circuit-1"),
            None,
            None,
            Vec::new(),
            1.0,
            0,
            false,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(
        h.service
            .single_population_name(&CircuitRef::from_path(&h.fixture.single), None)
            .unwrap(),
        "default"
    );
}

#[test]
fn circuit_summaries() {
    let h = harness(0.01);
    let config = &h.fixture.config;

    let counts = h.service.count(config, None).unwrap();
    assert_eq!(
        counts.nodes.populations,
        BTreeMap::from([
            ("default".to_string(), PopulationSize { size: 3 }),
            ("default2".to_string(), PopulationSize { size: 4 }),
        ])
    );
    let counts = h.service.count(config, Some("default2")).unwrap();
    assert_eq!(counts.nodes.populations.len(), 1);
    assert!(h.service.count(config, Some("missing")).is_err());

    let names = h.service.attribute_names(config, Some("default")).unwrap();
    assert_eq!(
        names.populations["default"],
        strings(&["layer", "morphology", "mtype", "region", "x", "y", "z"])
    );

    let dtypes = h.service.attribute_dtypes(config, Some("default2")).unwrap();
    let dtypes = &dtypes.populations["default2"];
    assert_eq!(dtypes["x"], "float32");
    assert_eq!(dtypes["mtype"], "category");
    assert_eq!(dtypes["layer"], "int64");
    assert_eq!(dtypes["morphology"], "object");
    assert_eq!(dtypes["@dynamics:holding_current"], "float64");

    let values = h.service.attribute_values(config, Some("default"), None).unwrap();
    let values = &values.populations["default"];
    assert_eq!(values["mtype"], strings(&["L2_X", "L6_Y"]));
    assert_eq!(values["region"], strings(&["SSp-ll1", "SSp-ll2", "VS"]));
    assert_eq!(values["morphology"], strings(&["morph-A", "morph-B", "morph-C"]));
    assert!(!values.contains_key("x"));
    assert!(!values.contains_key("layer"));

    let only_mtype = strings(&["mtype"]);
    let values = h
        .service
        .attribute_values(config, None, Some(&only_mtype))
        .unwrap();
    assert_eq!(values.populations["default2"].keys().collect::<Vec<_>>(), vec!["mtype"]);
    assert_eq!(values.populations["default2"]["mtype"], strings(&["L7_X", "L8_Y", "L9_Z"]));

    assert_eq!(
        h.service.node_set_names(config),
        NodeSetNames {
            node_sets: strings(&[
                "Layer2",
                "Literal",
                "Population_default",
                "Population_default2",
                "Union"
            ])
        }
    );
    assert!(h
        .service
        .node_set_names(&h.fixture.dir.path().join("missing.json"))
        .node_sets
        .is_empty());
}

#[test]
fn sampling_writes_a_nodes_file() {
    let h = harness(0.01);
    let output = h.fixture.dir.path().join("sampled.json");
    let mapping = h
        .service
        .sample(
            &CircuitRef::from_id("circuit-1"),
            None,
            &output,
            "default",
            0.5,
            102,
            &strings(&["mtype"]),
        )
        .unwrap();
    assert_eq!(mapping["default"], vec![1]);
    let nodes: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(nodes["populations"]["default"]["size"], serde_json::json!(1));
}
