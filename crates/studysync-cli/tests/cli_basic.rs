//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data directory.

use std::process::Command;

use tempfile::TempDir;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &TempDir, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_studysync"))
        .args(args)
        .env("STUDYSYNC_DATA_DIR", data_dir.path())
        .env_remove("STUDYSYNC_GOOGLE_TOKEN")
        .env_remove("STUDYSYNC_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_config_get_default() {
    let dir = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(&dir, &["config", "get", "sync.calendar_id"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "primary");
    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn test_config_set_persists() {
    let dir = TempDir::new().unwrap();
    let (_, _, code) = run_cli(&dir, &["config", "set", "sync.chunk_size", "25"]);
    assert_eq!(code, 0);

    let (stdout, _, _) = run_cli(&dir, &["config", "get", "sync.chunk_size"]);
    assert_eq!(stdout.trim(), "25");
}

#[test]
fn test_config_rejects_unknown_and_invalid() {
    let dir = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(&dir, &["config", "set", "sync.nope", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Unknown configuration key"));

    let (_, _, code) = run_cli(&dir, &["config", "set", "sync.time_zone", "Not/AZone"]);
    assert_eq!(code, 1);
}

#[test]
fn test_entity_add_and_list_json() {
    let dir = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(
        &dir,
        &[
            "entity",
            "add",
            "Linear Algebra",
            "--id",
            "class-1",
            "--start",
            "2025-03-10T09:00:00Z",
            "--end",
            "2025-03-10T10:30:00Z",
            "--location",
            "Room 204",
        ],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("class-1"));

    let (stdout, _, code) = run_cli(&dir, &["entity", "list", "--json"]);
    assert_eq!(code, 0);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed[0]["id"], "class-1");
    assert_eq!(parsed[0]["location"], "Room 204");
    assert!(parsed[0]["remote_event_id"].is_null());
}

#[test]
fn test_entity_add_rejects_inverted_range() {
    let dir = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(
        &dir,
        &[
            "entity",
            "add",
            "Backwards",
            "--start",
            "2025-03-10T10:00:00Z",
            "--end",
            "2025-03-10T09:00:00Z",
        ],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("Invalid time range"));
}

#[test]
fn test_entity_set_eligible_filters_list() {
    let dir = TempDir::new().unwrap();
    run_cli(
        &dir,
        &[
            "entity", "add", "Reading", "--id", "r1", "--start", "2025-03-11T09:00:00Z", "--end",
            "2025-03-11T10:00:00Z",
        ],
    );
    let (_, _, code) = run_cli(&dir, &["entity", "set-eligible", "r1", "false"]);
    assert_eq!(code, 0);

    let (stdout, _, _) = run_cli(&dir, &["entity", "list", "--eligible", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(0));
}

#[test]
fn test_sync_without_token_fails_fast() {
    let dir = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(&dir, &["sync", "all"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("STUDYSYNC_GOOGLE_TOKEN"));
}

#[test]
fn test_sync_one_unknown_entity() {
    let dir = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(&dir, &["sync", "one", "missing"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("entity not found"));
}
