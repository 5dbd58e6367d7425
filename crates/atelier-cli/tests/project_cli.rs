//! Integration tests for the project commands.
//!
//! These tests validate the CLI surface end to end:
//! - Creating, listing, showing and deleting projects
//! - Setting attributes from JSON
//! - Commit, checkout and log, including the past-commit rewrite
//! - JSON output and exit codes

mod common;

use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

use common::{atelier_cmd, atelier_in, create_project};

fn json_stdout(cmd: &mut assert_cmd::Command) -> Value {
    let output = cmd.output().expect("run atelier");
    assert!(output.status.success(), "command failed: {:?}", output);
    serde_json::from_slice(&output.stdout).expect("parse JSON output")
}

// ============================================================================
// Basics
// ============================================================================

#[test]
fn test_version_and_help() {
    atelier_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("atelier"));

    atelier_cmd()
        .args(["set", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("current_commit"));
}

#[test]
fn test_list_empty() {
    let temp = TempDir::new().expect("create temp dir");

    atelier_in(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No projects found."));

    let listed = json_stdout(atelier_in(temp.path()).args(["list", "--json"]));
    assert_eq!(listed, Value::Array(vec![]));
}

#[test]
fn test_new_list_show() {
    let temp = TempDir::new().expect("create temp dir");

    atelier_in(temp.path())
        .args(["new", "Churn model"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[ok] Created project `Churn model`"))
        .stdout(predicate::str::contains("Ports: 50000-50099"));

    let id = create_project(temp.path(), "second");

    atelier_in(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Churn model"))
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("50100-50199"))
        .stdout(predicate::str::contains("live"));

    let shown = json_stdout(atelier_in(temp.path()).args(["show", &id, "--json"]));
    assert_eq!(shown["id"], id.as_str());
    assert_eq!(shown["type"], "projects");
    assert_eq!(shown["attributes"]["name"], "second");
    assert_eq!(shown["attributes"]["canvas"], serde_json::json!({}));
    assert_eq!(shown["attributes"]["has_uncommitted_changes"], false);
    assert_eq!(
        shown["attributes"]["current_commit"],
        shown["attributes"]["latest_commit"]
    );

    atelier_in(temp.path())
        .args(["show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Name: second"))
        .stdout(predicate::str::contains("Changes: none"));
}

#[test]
fn test_unknown_project_exits_not_found() {
    let temp = TempDir::new().expect("create temp dir");

    atelier_in(temp.path())
        .args(["show", "0123456789abcdef0123456789abcdef"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("[err]"))
        .stderr(predicate::str::contains("atelier list"));

    atelier_in(temp.path())
        .args(["show", "../etc"])
        .assert()
        .code(3);
}

// ============================================================================
// Attributes
// ============================================================================

#[test]
fn test_set_and_rename() {
    let temp = TempDir::new().expect("create temp dir");
    let id = create_project(temp.path(), "draft");

    atelier_in(temp.path())
        .args(["set", &id, r#"{"canvas": {"nodes": [1, 2]}}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("[ok] Updated project `draft`"));

    let patch = temp.path().join("patch.json");
    fs::write(&patch, r#"{"workflow": {"steps": ["clean"]}}"#).expect("write patch");
    atelier_in(temp.path())
        .args(["set", &id, &format!("@{}", patch.display())])
        .assert()
        .success();

    atelier_in(temp.path())
        .args(["rename", &id, "final"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Renamed `draft` to `final`"));

    let shown = json_stdout(atelier_in(temp.path()).args(["show", &id, "--json"]));
    assert_eq!(shown["attributes"]["name"], "final");
    assert_eq!(shown["attributes"]["canvas"]["nodes"][1], 2);
    assert_eq!(shown["attributes"]["workflow"]["steps"][0], "clean");
    assert_eq!(shown["attributes"]["has_uncommitted_changes"], true);
}

#[test]
fn test_set_rejects_bad_attributes() {
    let temp = TempDir::new().expect("create temp dir");
    let id = create_project(temp.path(), "strict");

    // Engine-owned attribute
    atelier_in(temp.path())
        .args(["set", &id, r#"{"latest_commit": "abc"}"#])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("latest_commit"));

    // Unknown attribute
    atelier_in(temp.path())
        .args(["set", &id, r#"{"colour": "red"}"#])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("colour"));

    // Not an object
    atelier_in(temp.path())
        .args(["set", &id, "[1]"])
        .assert()
        .code(2);

    // Unknown ref
    atelier_in(temp.path())
        .args(["set", &id, r#"{"name": "x", "current_commit": "nope"}"#])
        .assert()
        .code(3);

    let shown = json_stdout(atelier_in(temp.path()).args(["show", &id, "--json"]));
    assert_eq!(shown["attributes"]["name"], "strict");
}

// ============================================================================
// Versioning
// ============================================================================

#[test]
fn test_status_commit_and_log() {
    let temp = TempDir::new().expect("create temp dir");
    let id = create_project(temp.path(), "versioned");

    atelier_in(temp.path())
        .args(["status", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("working tree clean"));

    atelier_in(temp.path())
        .args(["set", &id, r#"{"canvas": {"x": 1}}"#])
        .assert()
        .success();

    atelier_in(temp.path())
        .args(["status", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("changed:   .state/canvas.json"));

    let status = json_stdout(atelier_in(temp.path()).args(["status", &id, "--json"]));
    assert_eq!(status["has_uncommitted_changes"], true);
    assert_eq!(status["modified_paths"][0], ".state/canvas.json");

    let commit = json_stdout(atelier_in(temp.path()).args([
        "commit",
        &id,
        "-m",
        "edit canvas",
        "--author",
        "Ada",
        "--email",
        "ada@example.com",
        "--json",
    ]));
    assert_eq!(commit["type"], "commits");
    assert_eq!(commit["attributes"]["author_name"], "Ada");
    assert_eq!(commit["attributes"]["branch"], "main");
    assert!(commit["attributes"]["message"]
        .as_str()
        .expect("message is a string")
        .contains("edit canvas"));

    let log = json_stdout(atelier_in(temp.path()).args(["log", &id, "--json"]));
    let log = log.as_array().expect("log is an array");
    assert_eq!(log.len(), 2);
    assert_eq!(log[0]["id"], commit["id"]);

    atelier_in(temp.path())
        .args(["log", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("HISTORY"))
        .stdout(predicate::str::contains("edit canvas"))
        .stdout(predicate::str::contains("Initial commit"));

    let limited = json_stdout(atelier_in(temp.path()).args(["log", &id, "-n", "1", "--json"]));
    assert_eq!(limited.as_array().map(Vec::len), Some(1));
}

#[test]
fn test_checkout_past_commit_and_rewrite() {
    let temp = TempDir::new().expect("create temp dir");
    let id = create_project(temp.path(), "travel");

    let initial = json_stdout(atelier_in(temp.path()).args(["show", &id, "--json"]))
        ["attributes"]["latest_commit"]
        .as_str()
        .expect("sha")
        .to_string();

    atelier_in(temp.path())
        .args(["set", &id, r#"{"canvas": {"x": 1}}"#])
        .assert()
        .success();
    atelier_in(temp.path())
        .args(["commit", &id, "-m", "edit"])
        .assert()
        .success();

    atelier_in(temp.path())
        .args(["checkout", &id, &initial[..7]])
        .assert()
        .success()
        .stdout(predicate::str::contains(&initial[..8]))
        .stdout(predicate::str::contains("[hint] Viewing a past commit"));

    atelier_in(temp.path())
        .args(["commit", &id, "-m", "branch-forward"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[warn]"));

    let log = json_stdout(atelier_in(temp.path()).args(["log", &id, "--json"]));
    let log = log.as_array().expect("log is an array");
    assert_eq!(log.len(), 2);
    assert_eq!(log[1]["id"], initial.as_str());

    let shown = json_stdout(atelier_in(temp.path()).args(["show", &id, "--json"]));
    assert_eq!(
        shown["attributes"]["current_commit"],
        shown["attributes"]["latest_commit"]
    );
    assert_eq!(shown["attributes"]["canvas"], serde_json::json!({}));
}

#[test]
fn test_commit_with_unrecordable_author_is_rejected() {
    let temp = TempDir::new().expect("create temp dir");
    let id = create_project(temp.path(), "authors");

    atelier_in(temp.path())
        .args(["commit", &id, "--author", "Ada <ada@example.com>"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("author_name"));

    let log = json_stdout(atelier_in(temp.path()).args(["log", &id, "--json"]));
    assert_eq!(log.as_array().map(Vec::len), Some(1));
}

#[test]
fn test_checkout_unknown_ref() {
    let temp = TempDir::new().expect("create temp dir");
    let id = create_project(temp.path(), "refs");

    atelier_in(temp.path())
        .args(["checkout", &id, "no-such-branch"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("no-such-branch"));
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn test_rm_removes_project() {
    let temp = TempDir::new().expect("create temp dir");
    let id = create_project(temp.path(), "doomed");

    atelier_in(temp.path())
        .args(["rm", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted project `doomed`"));

    assert!(!temp.path().join("projects").join(&id).exists());

    atelier_in(temp.path())
        .args(["rm", &id])
        .assert()
        .code(3);

    // The freed port range is handed out again.
    atelier_in(temp.path())
        .args(["new", "reborn"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ports: 50000-50099"));
}

#[test]
fn test_invalid_config_fails_initialization() {
    let temp = TempDir::new().expect("create temp dir");
    fs::write(temp.path().join("config.yaml"), "ports:\n  width: 0\n").expect("write config");

    atelier_in(temp.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to initialize Atelier engine"))
        .stderr(predicate::str::contains("Hint:"));
}
