//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("sqlmcp").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn test_serve_help() {
    let mut cmd = Command::cargo_bin("sqlmcp").unwrap();
    cmd.arg("serve").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--db"))
        .stdout(predicate::str::contains("--port"));
}

#[test]
fn test_history_rejects_unknown_format() {
    let mut cmd = Command::cargo_bin("sqlmcp").unwrap();
    cmd.arg("history").arg("--format").arg("yaml");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format"));
}

#[test]
fn test_history_fails_when_server_unreachable() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = tmp.path().join("config.toml");
    std::fs::write(&config, "[chat]\ntool_timeout_secs = 2\n").unwrap();

    let mut cmd = Command::cargo_bin("sqlmcp").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("history")
        .arg("--server-url")
        .arg("http://127.0.0.1:9/mcp");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to initialize MCP session"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let mut cmd = Command::cargo_bin("sqlmcp").unwrap();
    cmd.arg("--config")
        .arg("/nonexistent/sqlmcp.toml")
        .arg("history");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config"));
}
