//! End-to-end smoke tests for the `swarmctl` binary (teacher's
//! `assert_cmd`-based integration-test convention).

use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn completion_bash_prints_a_script() {
    Command::cargo_bin("swarmctl")
        .unwrap()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(contains("complete"));
}

#[test]
fn apply_registers_a_workflow_file() {
    let dir = tempfile::tempdir().unwrap();
    let workflow_path = dir.path().join("demo.yaml");
    std::fs::write(
        &workflow_path,
        r#"
id: wf-smoke
name: smoke test workflow
workflow_type: Sequential
status: Active
steps: []
"#,
    )
    .unwrap();

    Command::cargo_bin("swarmctl")
        .unwrap()
        .args(["--resources-dir"])
        .arg(dir.path())
        .args(["apply", "-f"])
        .arg(&workflow_path)
        .assert()
        .success()
        .stdout(contains("applied workflow"));

    assert!(dir.path().join("demo.workflow.yaml").exists());
}

#[test]
fn get_workflows_without_name_fails_with_a_helpful_message() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("swarmctl")
        .unwrap()
        .args(["--resources-dir"])
        .arg(dir.path())
        .args(["get", "workflows"])
        .assert()
        .failure();
}
