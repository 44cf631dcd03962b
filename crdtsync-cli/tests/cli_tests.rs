//! Integration tests for the crdtsync binary
//!
//! Each invocation is a separate process sharing a temporary data directory:
//! - State persists between invocations
//! - Two replicas sync through the shared directory
//! - Raw JSON commands
//! - Argument errors

use serde_json::{json, Value};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn crdtsync(data_dir: &Path, replica: Option<&str>, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_crdtsync"));
    cmd.env_remove("CRDTSYNC_SYNC_REPLICA_ID")
        .env_remove("RUST_LOG")
        .arg("--log-level")
        .arg("error")
        .arg("--data-dir")
        .arg(data_dir);
    if let Some(replica) = replica {
        cmd.arg("--replica-id").arg(replica);
    }
    cmd.args(args).output().expect("failed to run crdtsync")
}

fn run_json(data_dir: &Path, replica: &str, args: &[&str]) -> Value {
    let output = crdtsync(data_dir, Some(replica), args);
    assert!(
        output.status.success(),
        "crdtsync {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_state_persists_between_invocations() {
    let dir = TempDir::new().unwrap();

    let created = run_json(dir.path(), "A", &["create", "pn-counter", "score", "--seed", "3"]);
    assert_eq!(created["response"], "created");
    assert_eq!(created["version"], 1);

    let applied = run_json(dir.path(), "A", &["apply", "score", "decrement", r#"{"amount": 5}"#]);
    assert_eq!(applied["version"], 2);

    let values = run_json(dir.path(), "A", &["show"]);
    assert_eq!(values, json!({"score": -2}));

    let status = run_json(dir.path(), "A", &["status"]);
    assert_eq!(status["crdt_count"], 1);
    assert_eq!(status["operation_count"], 1);
}

#[test]
fn test_replicas_sync_through_data_dir() {
    let dir = TempDir::new().unwrap();
    run_json(dir.path(), "A", &["create", "g-set", "tags", "--seed", r#"["a"]"#]);
    run_json(dir.path(), "B", &["create", "or-map", "cfg"]);
    run_json(dir.path(), "B", &["apply", "cfg", "set", r#"{"key": "mode", "value": "fast"}"#]);

    let synced = run_json(dir.path(), "A", &["sync"]);
    assert_eq!(synced["response"], "synced");
    assert_eq!(synced["replicas_synced"], 1);

    let a = run_json(dir.path(), "A", &["show"]);
    let b = run_json(dir.path(), "B", &["show"]);
    assert_eq!(a, b);
    assert_eq!(a["cfg"], json!({"mode": "fast"}));
}

#[test]
fn test_exec_runs_raw_command() {
    let dir = TempDir::new().unwrap();
    let command = json!({"command": "create-crdt", "crdt_type": "sequence", "crdt_id": "doc", "seed": ["x"]});
    let created = run_json(dir.path(), "A", &["exec", &command.to_string()]);
    assert_eq!(created["id"], "doc");

    let state = run_json(dir.path(), "A", &["show", "doc"]);
    assert_eq!(state["kind"], "sequence");
    assert_eq!(state["owner"], "A");
}

#[test]
fn test_errors_exit_non_zero() {
    let dir = TempDir::new().unwrap();

    let missing_replica = crdtsync(dir.path(), None, &["status"]);
    assert!(!missing_replica.status.success());
    assert!(String::from_utf8_lossy(&missing_replica.stderr).contains("replica id"));

    let unknown_kind = crdtsync(dir.path(), Some("A"), &["create", "b-tree", "x"]);
    assert!(!unknown_kind.status.success());

    let not_found = crdtsync(dir.path(), Some("A"), &["apply", "nope", "add", r#"{"element": "x"}"#]);
    assert!(!not_found.status.success());
    assert!(String::from_utf8_lossy(&not_found.stderr).contains("CRDT not found"));
}
