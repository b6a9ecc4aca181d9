//! Integration tests for the `thingsync` binary.
//!
//! Argument parsing, config handling and the API-backed commands, run
//! against temp config files and wiremock servers.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `thingsync` binary with env isolation.
fn thingsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("thingsync");
    cmd.env("HOME", "/tmp/thingsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/thingsync-cli-test-nonexistent")
        .env_remove("THINGSYNC_CONFIG")
        .env_remove("THINGSYNC_TOKEN")
        .env_remove("THINGSYNC_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Command pointed at `config`.
fn with_config(config: &Path) -> assert_cmd::Command {
    let mut cmd = thingsync_cmd();
    cmd.arg("--config").arg(config);
    cmd
}

const INSTALLATION: &str = r#"
[installations.entry1]
installed_app_id = "ia-1"
app_id = "app-1"
location_id = "loc-1"
access_token = "installed-app-token"
refresh_token = "refresh-secret"
created_at = "2026-01-01T00:00:00Z"
"#;

fn write_config(dir: &TempDir, base_url: &str, installations: bool) -> PathBuf {
    let mut body = format!(
        r#"
[api]
base_url = "{base_url}"
token = "plaintext-secret-token"

[webhook]
public_url = "https://hub.example.net"
instance_id = "inst1"
webhook_id = "hook1"
"#
    );
    if installations {
        body.push_str(INSTALLATION);
    }
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run a command off the async runtime so mock servers keep responding.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output())
        .await
        .unwrap()
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = thingsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    thingsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("setup")
            .and(predicate::str::contains("serve"))
            .and(predicate::str::contains("sync"))
            .and(predicate::str::contains("subscriptions")),
    );
}

#[test]
fn test_version_flag() {
    thingsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("thingsync"));
}

#[test]
fn test_invalid_subcommand() {
    let output = thingsync_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    thingsync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    thingsync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    with_config(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_masks_secrets() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "http://127.0.0.1:9", true);

    let output = with_config(&config)
        .args(["config", "show", "-o", "json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let shown: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["api"]["token"], "****");
    assert_eq!(shown["installations"]["entry1"]["access_token"], "****");
    assert_eq!(shown["installations"]["entry1"]["installed_app_id"], "ia-1");
    let text = combined_output(&output);
    assert!(!text.contains("plaintext-secret-token"));
    assert!(!text.contains("refresh-secret"));
}

// ── Installations ───────────────────────────────────────────────────

#[test]
fn test_installations_list_plain() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "http://127.0.0.1:9", true);

    with_config(&config)
        .args(["installations", "list", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::diff("ia-1\n"));
}

#[test]
fn test_installations_remove_requires_yes_when_not_interactive() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "http://127.0.0.1:9", true);

    with_config(&config)
        .args(["installations", "remove", "ia-1"])
        .assert()
        .code(2);
    assert!(std::fs::read_to_string(&config).unwrap().contains("ia-1"));
}

#[test]
fn test_installations_remove_drops_record() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "http://127.0.0.1:9", true);

    with_config(&config)
        .args(["installations", "remove", "ia-1", "--yes"])
        .assert()
        .success();

    let contents = std::fs::read_to_string(&config).unwrap();
    assert!(!contents.contains("ia-1"));
    assert!(contents.contains("hook1"), "unrelated settings kept:\n{contents}");
}

#[test]
fn test_installations_remove_unknown_is_not_found() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "http://127.0.0.1:9", true);

    with_config(&config)
        .args(["installations", "remove", "ia-404", "--yes"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_sync_without_installations() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "http://127.0.0.1:9", false);

    with_config(&config)
        .arg("sync")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("thingsync setup"));
}

#[test]
fn test_invalid_output_format() {
    let output = thingsync_cmd()
        .args(["--output", "invalid", "locations", "list"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about valid output formats:\n{text}"
    );
}

// ── API-backed commands ─────────────────────────────────────────────

fn device_lifecycle_sub() -> Value {
    json!({
        "id": "lifecycle",
        "installedAppId": "ia-1",
        "sourceType": "DEVICE_LIFECYCLE",
        "deviceLifecycle": { "locationId": "loc-1" }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_locations_list_uses_token_flag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "locationId": "loc-1", "name": "Home" },
                { "locationId": "loc-2", "name": "Cabin" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.uri(), false);
    let mut cmd = with_config(&config);
    cmd.args(["--token", "abc", "locations", "list", "-o", "plain"]);

    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "loc-1\nloc-2\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_creates_missing_subscription() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .and(query_param("locationId", "loc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "deviceId": "d1",
                "label": "Porch light",
                "components": [{ "id": "main", "capabilities": [{ "id": "switch" }] }]
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/installedapps/ia-1/subscriptions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "items": [device_lifecycle_sub()] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/installedapps/ia-1/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "s1",
            "installedAppId": "ia-1",
            "sourceType": "CAPABILITY",
            "capability": {
                "locationId": "loc-1",
                "capability": "switch",
                "attribute": "*",
                "value": "*",
                "stateChangeOnly": true
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.uri(), true);
    let mut cmd = with_config(&config);
    cmd.args(["sync", "-o", "json"]);

    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let rows: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        rows,
        json!([{
            "installed_app_id": "ia-1",
            "capability": "switch",
            "action": "create",
            "result": "ok"
        }])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_reports_failed_changes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/installedapps/ia-1/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "s9",
                    "installedAppId": "ia-1",
                    "sourceType": "CAPABILITY",
                    "capability": { "locationId": "loc-1", "capability": "lock" }
                },
                device_lifecycle_sub()
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/installedapps/ia-1/subscriptions/s9"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.uri(), true);
    let mut cmd = with_config(&config);
    cmd.args(["sync", "-o", "plain"]);

    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("1 subscription change(s) failed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_subscriptions_list_uses_installation_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/installedapps/ia-1/subscriptions"))
        .and(wiremock::matchers::header(
            "authorization",
            "Bearer installed-app-token",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "s1",
                    "installedAppId": "ia-1",
                    "sourceType": "CAPABILITY",
                    "capability": { "locationId": "loc-1", "capability": "switch" }
                },
                { "id": "s2", "installedAppId": "ia-1", "sourceType": "DEVICE" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.uri(), true);
    let mut cmd = with_config(&config);
    cmd.args(["subscriptions", "list", "-o", "json"]);

    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let items: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(items[0]["capability"], "switch");
    assert_eq!(items[1]["sourceType"], "DEVICE");
    assert_eq!(items[1]["capability"], Value::Null);
}
