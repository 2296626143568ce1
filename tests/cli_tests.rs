//! CLI tests for run / validate / compile.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

const CHAIN_WORKFLOW: &str = r#"
id: wf-demo
name: Demo chain
steps:
  - id: seed
    capability: transform
    config:
      script: "{ out: 5 }"
    outputs: [out]
  - id: double
    capability: transform
    dependencies: [seed]
    inputs:
      x: "$steps.seed.out"
    config:
      script: "{ out: x * 2 }"
    outputs: [out]
"#;

#[test]
fn validate_accepts_a_good_workflow() {
    let file = write_file(".yaml", CHAIN_WORKFLOW);

    Command::cargo_bin("strand")
        .unwrap()
        .arg("validate")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"))
        .stdout(predicate::str::contains("2 steps"));
}

#[test]
fn validate_rejects_a_cyclic_workflow() {
    let file = write_file(
        ".yaml",
        r#"
id: wf-loop
name: Loop
steps:
  - id: a
    capability: transform
    dependencies: [b]
    config:
      script: "{ out: 1 }"
  - id: b
    capability: transform
    dependencies: [a]
    config:
      script: "{ out: 1 }"
"#,
    );

    Command::cargo_bin("strand")
        .unwrap()
        .arg("validate")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("cyclic dependency"));
}

#[test]
fn run_executes_a_transform_chain() {
    let file = write_file(".yaml", CHAIN_WORKFLOW);

    Command::cargo_bin("strand")
        .unwrap()
        .arg("run")
        .arg(file.path())
        .args(["--provider", "mock"])
        .assert()
        .success()
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("\"out\": 10"));
}

#[test]
fn run_reports_failing_step() {
    let file = write_file(
        ".yaml",
        r#"
id: wf-bad
name: Bad
steps:
  - id: broken
    capability: transform
    config:
      script: "{ out: missing + 1 }"
"#,
    );

    Command::cargo_bin("strand")
        .unwrap()
        .arg("run")
        .arg(file.path())
        .args(["--provider", "mock"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("failed"))
        .stdout(predicate::str::contains("broken"));
}

#[test]
fn compile_emits_a_workflow_definition() {
    let file = write_file(
        ".json",
        r#"{
  "id": "wf-compiled",
  "name": "Compiled",
  "nodes": [
    {"id": "seed", "type": "transform", "config": {"script": "{ value: 1 }"}},
    {"id": "sink", "type": "output", "config": {}}
  ],
  "connections": [{"source": "seed", "target": "sink"}]
}"#,
    );

    Command::cargo_bin("strand")
        .unwrap()
        .arg("compile")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("wf-compiled"))
        .stdout(predicate::str::contains("$steps.seed.value"));
}

#[test]
fn unknown_file_is_an_error() {
    Command::cargo_bin("strand")
        .unwrap()
        .arg("validate")
        .arg("definitely-not-here.yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}
