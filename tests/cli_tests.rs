//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a command for the dashsync binary
fn dashsync_cmd() -> Command {
    let mut cmd = Command::cargo_bin("dashsync").unwrap();
    // Keep host environment out of the picture
    cmd.env_remove("DASHSYNC_CONFIG")
        .env_remove("DASHSYNC_STREAM_URL")
        .env_remove("DASHSYNC_FETCH_URL");
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    dashsync_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dashsync"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("version"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    dashsync_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dashsync"))
        .stdout(predicate::str::contains("Branch"))
        .stdout(predicate::str::contains("Target"));
}

#[test]
fn test_short_version_flag() {
    dashsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dashsync"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_default() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    dashsync_cmd()
        .current_dir(temp_dir.path())
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("[stream]"))
        .stdout(predicate::str::contains("[polling]"))
        .stdout(predicate::str::contains("[logging]"))
        .stdout(predicate::str::contains("[storage]"));
}

#[test]
fn test_config_validate_default() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    dashsync_cmd()
        .current_dir(temp_dir.path())
        .arg("config")
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    dashsync_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg("/nonexistent/path/config.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found").or(predicate::str::contains("Error")));
}

#[test]
fn test_config_init_help() {
    dashsync_cmd()
        .arg("config")
        .arg("init")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialize"))
        .stdout(predicate::str::contains("--path"))
        .stdout(predicate::str::contains("--force"));
}

// ─────────────────────────────────────────────────────────────────
// Watch Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_watch_help() {
    dashsync_cmd()
        .arg("watch")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--url"))
        .stdout(predicate::str::contains("--fetch-url"))
        .stdout(predicate::str::contains("--interval-ms"))
        .stdout(predicate::str::contains("--no-auto-refresh"));
}

#[test]
fn test_watch_requires_a_source() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    dashsync_cmd()
        .current_dir(temp_dir.path())
        .arg("watch")
        .arg("--no-store")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to watch"));
}

#[test]
fn test_watch_rejects_http_stream_url() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    dashsync_cmd()
        .current_dir(temp_dir.path())
        .arg("watch")
        .arg("--url")
        .arg("http://example.com/live")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ws:// or wss://"));
}

#[test]
fn test_watch_with_invalid_config() {
    dashsync_cmd()
        .arg("watch")
        .arg("--config")
        .arg("/nonexistent/config.toml")
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────
// Verbosity Flag Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_verbose_flag() {
    dashsync_cmd().arg("-v").arg("version").assert().success();
}

#[test]
fn test_very_verbose_flag() {
    dashsync_cmd().arg("-vv").arg("version").assert().success();
}

#[test]
fn test_quiet_flag() {
    dashsync_cmd().arg("--quiet").arg("version").assert().success();
}

// ─────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_command() {
    dashsync_cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    dashsync_cmd().assert().failure();
}
