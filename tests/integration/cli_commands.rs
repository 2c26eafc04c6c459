#![allow(missing_docs)]

mod common;

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use common::CircuitFixture;
use serde_json::{json, Value};
use tempfile::TempDir;

struct Setup {
    fixture: CircuitFixture,
    _cache: TempDir,
    config: PathBuf,
}

fn setup() -> Setup {
    let fixture = CircuitFixture::new();
    let cache = TempDir::new().unwrap();
    let config = fixture.dir.path().join("settings.toml");
    let settings = fixture.settings(cache.path());
    fs::write(&config, toml::to_string(&settings).unwrap()).unwrap();
    Setup {
        fixture,
        _cache: cache,
        config,
    }
}

fn run_json(setup: &Setup, args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("circuitview")
        .arg("--config")
        .arg(&setup.config)
        .args(args)
        .env_remove("RUST_LOG")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn export_samples_the_single_population() {
    let setup = setup();
    let input = setup.fixture.single.to_str().unwrap();
    let json = run_json(
        &setup,
        &["export", "--input-path", input, "--sampling-ratio", "0.5", "--seed", "102"],
    );
    assert_eq!(json["columns"], json!(["x", "y", "z", "region", "mtype"]));
    assert_eq!(json["index"], json!([0]));
    assert_eq!(
        json["data"],
        json!([[201.0, 202.0, 203.0, "SSp-ll2", "L6_Y"]])
    );
}

#[test]
fn export_writes_filtered_modalities_to_a_file() {
    let setup = setup();
    let output = setup.fixture.dir.path().join("export.json");
    cargo_bin_cmd!("circuitview")
        .arg("--config")
        .arg(&setup.config)
        .args([
            "export",
            "--circuit-id",
            "circuit-1",
            "--population-name",
            "default2",
            "--modality",
            "mtype",
            "--modality",
            "position",
            "--mtype",
            "L8_Y",
            "--sampling-ratio",
            "1",
        ])
        .arg("--output-path")
        .arg(&output)
        .assert()
        .success();
    let json: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(json["columns"], json!(["mtype", "x", "y", "z"]));
    assert_eq!(json["index"], json!([0, 1]));
    assert_eq!(json["data"][1], json!(["L8_Y", 601.0, 602.0, 603.0]));
}

#[test]
fn export_text_is_tab_separated() {
    let setup = setup();
    let output = cargo_bin_cmd!("circuitview")
        .arg("--config")
        .arg(&setup.config)
        .args(["--format", "text", "export", "--input-path"])
        .arg(&setup.fixture.single)
        .args(["--modality", "mtype", "--region", "VS", "--sampling-ratio", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).unwrap(), "mtype\nL6_Y\n");
}

#[test]
fn count_and_node_sets_report_the_circuit() {
    let setup = setup();
    let counts = run_json(&setup, &["count", "--circuit-id", "circuit-1"]);
    assert_eq!(counts["nodes"]["populations"]["default"]["size"], json!(3));
    assert_eq!(counts["nodes"]["populations"]["default2"]["size"], json!(4));

    let dtypes = run_json(
        &setup,
        &["attributes", "--circuit-id", "circuit-1", "--population-name", "default2", "--dtypes"],
    );
    assert_eq!(dtypes["populations"]["default2"]["mtype"], json!("category"));

    let output = cargo_bin_cmd!("circuitview")
        .arg("--config")
        .arg(&setup.config)
        .args(["--format", "text", "node-sets", "--circuit-id", "circuit-1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "Layer2\nLiteral\nPopulation_default\nPopulation_default2\nUnion\n"
    );
}

#[test]
fn sample_writes_the_nodes_file() {
    let setup = setup();
    let output = setup.fixture.dir.path().join("sampled.json");
    let mapping = run_json(
        &setup,
        &[
            "sample",
            "--circuit-id",
            "circuit-1",
            "--population-name",
            "default",
            "--sampling-ratio",
            "0.5",
            "--seed",
            "102",
            "--output-path",
            output.to_str().unwrap(),
        ],
    );
    assert_eq!(mapping, json!({"default": [1]}));
    assert!(output.exists());
}

#[test]
fn unknown_circuits_fail_with_a_message() {
    let setup = setup();
    let output = cargo_bin_cmd!("circuitview")
        .arg("--config")
        .arg(&setup.config)
        .args(["count", "--circuit-id", "nope"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.contains("Circuit id not found: 'nope'"), "{stderr}");

    cargo_bin_cmd!("circuitview")
        .arg("--config")
        .arg(&setup.config)
        .arg("count")
        .assert()
        .failure();
}
