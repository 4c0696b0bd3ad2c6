//! Command-line smoke tests

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `an` isolated from the user's config, data and log directories
fn an(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("an").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("XDG_DATA_HOME", home.path().join(".local/share"))
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("TAVILY_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let home = tempfile::tempdir().unwrap();
    an(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("tools"))
        .stdout(predicate::str::contains("logs"));
}

#[test]
fn test_version_is_reported() {
    let home = tempfile::tempdir().unwrap();
    an(&home).arg("--version").assert().success().stdout(predicate::str::starts_with("an "));
}

#[test]
fn test_analyze_requires_a_subject() {
    let home = tempfile::tempdir().unwrap();
    an(&home).arg("analyze").assert().failure();
}

#[test]
fn test_analyze_without_api_key_fails_fast() {
    let home = tempfile::tempdir().unwrap();
    an(&home)
        .args(["analyze", "ACME", "--depth", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ANTHROPIC_API_KEY"));
}

#[test]
fn test_tools_lists_builtin_tools() {
    let home = tempfile::tempdir().unwrap();
    an(&home)
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("filing"))
        .stdout(predicate::str::contains("metrics"))
        .stdout(predicate::str::contains("valuation"))
        .stdout(predicate::str::contains("search").not());
}

#[test]
fn test_config_prints_resolved_yaml() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join(".analyst.yml"), "max-concurrent-requests: 5\n").unwrap();
    an(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("max-concurrent-requests: 5"))
        .stdout(predicate::str::contains("threshold-tokens"));
}

#[test]
fn test_logs_reads_log_file() {
    let home = tempfile::tempdir().unwrap();
    an(&home).args(["logs", "-n", "5"]).assert().success();
}
