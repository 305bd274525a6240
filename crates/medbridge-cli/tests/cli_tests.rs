//! End-to-end tests of the `medbridge` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn medbridge(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("medbridge").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("MEDBRIDGE_PRIMARY_DB")
        .env("LOG_LEVEL", "warn");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    medbridge(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_status_on_fresh_store() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("fresh.db");

    medbridge(&dir)
        .args(["status", "--primary-db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Ledger entries:     0"))
        .stdout(predicate::str::contains("(none)"));

    assert!(db.exists());
}

#[test]
fn test_status_json_output() {
    let dir = TempDir::new().unwrap();

    let output = medbridge(&dir)
        .args(["status", "--json", "--primary-db", "store.db"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["counts"]["subjects"], 0);
    assert!(summary["top_conditions"].as_array().unwrap().is_empty());
}

#[test]
fn test_invalid_schema_fails_before_connecting() {
    let dir = TempDir::new().unwrap();

    medbridge(&dir)
        .args([
            "migrate",
            "--pg-url",
            "postgresql://postgres@127.0.0.1:1/medical",
            "--schema",
            "Bad-Schema",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid --schema"));
}
