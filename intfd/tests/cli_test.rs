//! CLI tests for the intfd binary

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SCENARIO: &str = r#"
coordinator:
  event-timeout-ms: 200
subscribers:
  - id: authmgr
    events: [create, link-up, authorized]
  - id: fdb
    delay-ms: 1
    startup: high
interfaces:
  - id: 1
    name: Ethernet0
steps:
  - start-ports
  - notify: { intf: 1, event: attach }
  - notify: { intf: 1, event: link-up }
  - notify: { intf: 9, event: link-up }
"#;

/// Command isolated from the user's config and log directories
fn intfd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("intfd").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("XDG_CONFIG_HOME", home.path().join("config"));
    cmd
}

// =============================================================================
// Inspection commands
// =============================================================================

#[test]
fn test_events_lists_every_kind() {
    let home = TempDir::new().unwrap();
    intfd(&home)
        .arg("events")
        .assert()
        .success()
        .stdout(predicate::str::contains("link-up"))
        .stdout(predicate::str::contains("ethernet-switchport"))
        .stdout(predicate::str::contains("0x00000001"));
}

#[test]
fn test_config_prints_defaults() {
    let home = TempDir::new().unwrap();
    intfd(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("event-timeout-ms: 600000"))
        .stdout(predicate::str::contains("correlator-pool-size: 32000"));
}

#[test]
fn test_config_reads_local_file() {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join(".intfd.yml"), "coordinator:\n  event-timeout-ms: 1234\n").unwrap();
    intfd(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("event-timeout-ms: 1234"));
}

// =============================================================================
// Simulation
// =============================================================================

#[test]
fn test_simulate_text() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("scenario.yml");
    fs::write(&path, SCENARIO).unwrap();

    intfd(&home)
        .arg("simulate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Ethernet0"));
}

#[test]
fn test_simulate_json() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("scenario.yml");
    fs::write(&path, SCENARIO).unwrap();

    let output = intfd(&home)
        .args(["simulate", "--format", "json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let oks: Vec<bool> = report["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["ok"].as_bool().unwrap())
        .collect();
    assert_eq!(oks, vec![true, true, true, true, false]);
    assert_eq!(report["interfaces"][0]["name"], "Ethernet0");
}

#[test]
fn test_simulate_missing_file_fails() {
    let home = TempDir::new().unwrap();
    intfd(&home)
        .args(["simulate", "does-not-exist.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.yml"));
}

#[test]
fn test_bad_format_is_rejected() {
    let home = TempDir::new().unwrap();
    intfd(&home)
        .args(["simulate", "x.yml", "--format", "xml"])
        .assert()
        .failure();
}
