#![allow(missing_docs)]

mod common;

use circuitview::population::{Circuit, Column, NodePopulation, NodeSets, Query, QueryValue};
use circuitview::query::{select, QueryOptions};
use circuitview::{CircuitError, ErrorKind};
use common::CircuitFixture;

struct Opened {
    _fixture: CircuitFixture,
    default: Box<dyn NodePopulation>,
    default2: Box<dyn NodePopulation>,
    node_sets: NodeSets,
}

fn open() -> Opened {
    let fixture = CircuitFixture::new();
    let circuit = Circuit::open(&fixture.config).expect("circuit");
    Opened {
        default: circuit.node_population("default").expect("default"),
        default2: circuit.node_population("default2").expect("default2"),
        node_sets: circuit.node_sets().expect("node sets"),
        _fixture: fixture,
    }
}

fn query(pairs: &[(&str, QueryValue)]) -> Query {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn positions(queries: Vec<Query>) -> QueryOptions {
    QueryOptions {
        queries,
        attributes: Some(vec!["x".into(), "y".into(), "z".into(), "mtype".into()]),
        ..QueryOptions::default()
    }
}

#[test]
fn missing_or_empty_queries_select_everything() {
    let opened = open();
    for queries in [Vec::new(), vec![Query::new()]] {
        let table = select(opened.default2.as_ref(), None, &positions(queries)).unwrap();
        assert_eq!(table.index(), &[0, 1, 2, 3]);
        assert_eq!(
            table.column("x"),
            Some(&Column::Float32(vec![401.0, 501.0, 601.0, 701.0]))
        );
    }
}

#[test]
fn single_value_filters_by_equality() {
    let opened = open();
    let options = positions(vec![query(&[("mtype", "L8_Y".into())])]);
    let table = select(opened.default2.as_ref(), None, &options).unwrap();
    assert_eq!(table.index(), &[1, 2]);
    assert_eq!(
        table.column("y"),
        Some(&Column::Float32(vec![502.0, 602.0]))
    );
    assert_eq!(table.column("mtype").unwrap().dtype(), "category");
}

#[test]
fn predicates_of_one_query_are_combined() {
    let opened = open();
    let options = positions(vec![query(&[
        ("mtype", ["L8_Y", "L9_Z"].into_iter().collect()),
        ("morphology", "morph-E".into()),
    ])]);
    let table = select(opened.default2.as_ref(), None, &options).unwrap();
    assert_eq!(table.index(), &[1]);
    assert_eq!(table.column_names(), vec!["x", "y", "z", "mtype"]);
}

#[test]
fn several_queries_are_merged_in_id_order() {
    let opened = open();
    let options = positions(vec![
        query(&[("mtype", "L7_X".into())]),
        query(&[("morphology", "morph-F".into())]),
    ]);
    let table = select(opened.default2.as_ref(), None, &options).unwrap();
    assert_eq!(table.index(), &[0, 2]);
    assert_eq!(
        table.column("z"),
        Some(&Column::Float32(vec![403.0, 603.0]))
    );
}

#[test]
fn later_queries_skip_ids_already_taken() {
    let opened = open();
    let options = positions(vec![
        query(&[("mtype", "L8_Y".into())]),
        query(&[("layer", 8_i64.into())]),
    ]);
    let table = select(opened.default2.as_ref(), None, &options).unwrap();
    assert_eq!(table.index(), &[1, 2]);
}

#[test]
fn empty_attribute_list_returns_only_the_index() {
    let opened = open();
    let options = QueryOptions {
        queries: vec![query(&[
            ("mtype", "L8_Y".into()),
            ("morphology", "morph-E".into()),
        ])],
        attributes: Some(Vec::new()),
        ..QueryOptions::default()
    };
    let table = select(opened.default2.as_ref(), None, &options).unwrap();
    assert_eq!(table.index(), &[1]);
    assert!(table.column_names().is_empty());
}

#[test]
fn unknown_attributes_are_reported_with_the_population() {
    let opened = open();
    for attribute in ["unknown", "@dynamics:unknown"] {
        let options = QueryOptions {
            attributes: Some(vec!["x".into(), attribute.into()]),
            ..QueryOptions::default()
        };
        let err = select(opened.default2.as_ref(), None, &options).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Attribute not found in population default2: {attribute}")
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
    let options = positions(vec![query(&[("unknown", "value".into())])]);
    assert!(matches!(
        select(opened.default2.as_ref(), None, &options),
        Err(CircuitError::AttributeNotFound { .. })
    ));
}

#[test]
fn default_attributes_include_prefixed_dynamics() {
    let opened = open();
    let options = QueryOptions {
        queries: vec![query(&[("mtype", "L8_Y".into())])],
        ..QueryOptions::default()
    };
    let table = select(opened.default2.as_ref(), None, &options).unwrap();
    assert_eq!(
        table.column_names(),
        vec![
            "layer",
            "morphology",
            "mtype",
            "x",
            "y",
            "z",
            "@dynamics:holding_current"
        ]
    );
    assert_eq!(
        table.column("@dynamics:holding_current"),
        Some(&Column::Float64(vec![1.2, 1.3]))
    );
    assert_eq!(table.column("layer"), Some(&Column::Int64(vec![8, 8])));
    assert_eq!(table.column("morphology").unwrap().dtype(), "object");
}

#[test]
fn string_region_columns_become_categories() {
    let opened = open();
    let options = QueryOptions {
        attributes: Some(vec!["region".into()]),
        ..QueryOptions::default()
    };
    let table = select(opened.default.as_ref(), None, &options).unwrap();
    assert_eq!(
        table.column("region"),
        Some(&Column::Category {
            codes: vec![0, 1, 2],
            categories: vec!["SSp-ll1".into(), "SSp-ll2".into(), "VS".into()],
        })
    );
}

#[test]
fn node_sets_restrict_the_candidates() {
    let opened = open();
    let run = |population: &dyn NodePopulation, name: &str| {
        let options = QueryOptions {
            node_set: Some(name.to_string()),
            attributes: Some(vec!["mtype".into()]),
            ..QueryOptions::default()
        };
        select(population, Some(&opened.node_sets), &options).map(|t| t.index().to_vec())
    };
    assert_eq!(run(opened.default.as_ref(), "Layer2").unwrap(), vec![0]);
    assert_eq!(run(opened.default.as_ref(), "Population_default").unwrap(), vec![0, 1, 2]);
    assert!(run(opened.default.as_ref(), "Population_default2").unwrap().is_empty());
    assert_eq!(run(opened.default.as_ref(), "Union").unwrap(), vec![0, 2]);
    assert_eq!(run(opened.default2.as_ref(), "Population_default2").unwrap(), vec![0, 1, 2, 3]);
    assert!(matches!(
        run(opened.default.as_ref(), "Missing"),
        Err(CircuitError::NodeSetNotFound(name)) if name == "Missing"
    ));
}

#[test]
fn literal_node_sets_are_refused_on_reindexed_populations() {
    let opened = open();
    let options = |name: &str| QueryOptions {
        node_set: Some(name.to_string()),
        attributes: Some(Vec::new()),
        reindexed: true,
        ..QueryOptions::default()
    };
    for name in ["Literal", "Union"] {
        let err = select(opened.default.as_ref(), Some(&opened.node_sets), &options(name))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{name}");
    }
    let table = select(opened.default.as_ref(), Some(&opened.node_sets), &options("Layer2"))
        .unwrap();
    assert_eq!(table.index(), &[0]);
}

#[test]
fn sampling_is_reproducible_for_a_seed() {
    let opened = open();
    let options = QueryOptions {
        sampling_ratio: 0.5,
        seed: 103,
        ..positions(Vec::new())
    };
    let first = select(opened.default2.as_ref(), None, &options).unwrap();
    let second = select(opened.default2.as_ref(), None, &options).unwrap();
    assert_eq!(first.index(), &[1, 3]);
    assert_eq!(first, second);

    let options = QueryOptions {
        sampling_ratio: 0.5,
        seed: 102,
        ..positions(Vec::new())
    };
    let table = select(opened.default.as_ref(), None, &options).unwrap();
    assert_eq!(table.index(), &[1]);
    assert_eq!(
        table.column("mtype"),
        Some(&Column::Category {
            codes: vec![1],
            categories: vec!["L2_X".into(), "L6_Y".into()],
        })
    );
}

#[test]
fn ids_can_be_dropped_from_the_result() {
    let opened = open();
    let options = QueryOptions {
        include_ids: false,
        ..positions(vec![query(&[("mtype", "L9_Z".into())])])
    };
    let table = select(opened.default2.as_ref(), None, &options).unwrap();
    assert_eq!(table.index(), &[0]);
    assert_eq!(table.column("x"), Some(&Column::Float32(vec![701.0])));
}

#[test]
fn negative_ratios_are_rejected() {
    let opened = open();
    let options = QueryOptions {
        sampling_ratio: -0.1,
        ..positions(Vec::new())
    };
    let err = select(opened.default.as_ref(), None, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
