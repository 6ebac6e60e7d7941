//! CLI integration tests

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

/// Build command for the klcheck-cli binary.
fn klcheck_cli() -> Command {
    cargo_bin_cmd!("klcheck-cli")
}

/// Path to klcheck library test fixtures (relative to workspace).
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("klcheck")
        .join("tests")
        .join("fixtures")
}

#[test]
fn test_cli_help() {
    let mut cmd = klcheck_cli();

    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("KiCad"));
}

#[test]
fn test_cli_version() {
    let mut cmd = klcheck_cli();

    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_rules_list() {
    let mut cmd = klcheck_cli();

    cmd.arg("rules").arg("--verbose");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("S4.1"))
        .stdout(predicate::str::contains("EC01"))
        .stdout(predicate::str::contains("https://klc.kicad.org/symbol/s4/s4.1/"));
}

#[test]
fn test_cli_check_clean_rule() {
    let mut cmd = klcheck_cli();

    cmd.arg("check")
        .arg(fixtures_dir().join("Device.kicad_sym"))
        .args(["-r", "G1.1,G1.10"])
        .arg("--nocolor");

    cmd.assert()
        .code(0)
        .stdout(predicate::str::contains("0 errors, 0 warnings"));
}

#[test]
fn test_cli_check_reports_errors() {
    let mut cmd = klcheck_cli();

    cmd.arg("check")
        .arg(fixtures_dir().join("Violations.kicad_sym"))
        .args(["-r", "G1.1"])
        .arg("--nocolor");

    cmd.assert()
        .code(3)
        .stdout(predicate::str::contains("Violating G1.1"))
        .stdout(predicate::str::contains("Symbol name must contain only legal characters"));
}

#[test]
fn test_cli_warnings_only_exit_code() {
    let mut cmd = klcheck_cli();

    cmd.arg("check")
        .arg(fixtures_dir().join("Violations.kicad_sym"))
        .args(["-r", "S4.2", "-c", "U_Exception", "-x", "--nocolor"]);

    cmd.assert().code(2);
}

#[test]
fn test_cli_silent() {
    let mut cmd = klcheck_cli();

    cmd.arg("check")
        .arg(fixtures_dir().join("Violations.kicad_sym"))
        .args(["-r", "G1.1", "-s"]);

    cmd.assert().code(3).stdout(predicate::str::is_empty());
}

#[test]
fn test_cli_json_output() {
    let mut cmd = klcheck_cli();

    cmd.arg("check")
        .arg(fixtures_dir().join("Violations.kicad_sym"))
        .args(["-r", "G1.1", "--format", "json"]);

    let output = cmd.output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["errors"], 1);
    assert_eq!(json["libraries"][0]["library"], "Violations");
}

#[test]
fn test_cli_unknown_rule() {
    let mut cmd = klcheck_cli();

    cmd.arg("check")
        .arg(fixtures_dir().join("Device.kicad_sym"))
        .args(["-r", "Z9.9"]);

    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown rule: Z9.9"));
}

#[test]
fn test_cli_no_files_matched() {
    let mut cmd = klcheck_cli();

    cmd.arg("check").arg(fixtures_dir().join("*.nothing"));

    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("no library files matched"));
}

#[test]
fn test_cli_writes_reports() {
    let dir = tempfile::tempdir().unwrap();
    let junit = dir.path().join("junit.xml");
    let log = dir.path().join("klc");

    let mut cmd = klcheck_cli();
    cmd.current_dir(dir.path())
        .arg("check")
        .arg(fixtures_dir().join("Violations.kicad_sym"))
        .args(["-r", "G1.1", "-m", "-s"])
        .arg("--junit")
        .arg(&junit)
        .arg("--log")
        .arg(&log);
    cmd.assert().code(3);

    let xml = std::fs::read_to_string(&junit).unwrap();
    assert!(xml.contains("Violations:Bad Name - Errors"));
    let json = std::fs::read_to_string(dir.path().join("klc.json")).unwrap();
    assert!(json.contains("\"G1.1\""));
    let metrics = std::fs::read_to_string(dir.path().join("metrics.txt")).unwrap();
    assert!(metrics.contains("Violations.total_errors 1"));
}

#[test]
fn test_cli_fix_saves_library() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Violations.kicad_sym");
    std::fs::copy(fixtures_dir().join("Violations.kicad_sym"), &path).unwrap();

    let mut cmd = klcheck_cli();
    cmd.arg("check")
        .arg(&path)
        .args(["-r", "S4.1", "-c", "U_ShortPin", "--fix", "--nocolor"]);
    cmd.assert()
        .code(0)
        .stdout(predicate::str::contains("Saved"));

    let mut cmd = klcheck_cli();
    cmd.arg("check").arg(&path).args(["-r", "S4.1", "-c", "U_ShortPin"]);
    cmd.assert().code(0);
}
