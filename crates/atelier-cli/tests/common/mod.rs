//! Shared test utilities for atelier-cli integration tests.

use std::path::Path;

use assert_cmd::Command;

/// Get a Command for the atelier binary.
///
/// # Panics
///
/// Panics if the atelier binary cannot be found. This should not happen
/// in a properly configured test environment.
#[allow(deprecated)]
pub fn atelier_cmd() -> Command {
    Command::cargo_bin("atelier").expect("atelier binary should exist")
}

/// Get a Command rooted in `home`, isolated from the user's config and projects.
pub fn atelier_in(home: &Path) -> Command {
    let mut cmd = atelier_cmd();
    cmd.env("ATELIER_ROOT", home.join("projects"))
        .env("ATELIER_CONFIG", home.join("config.yaml"))
        .env("ATELIER_COLOR", "never")
        .env_remove("ATELIER_VERBOSE");
    cmd
}

/// Create a project and return its ID.
pub fn create_project(home: &Path, name: &str) -> String {
    let output = atelier_in(home)
        .args(["new", name, "--json"])
        .output()
        .expect("run atelier new");
    assert!(output.status.success(), "atelier new failed: {:?}", output);
    let resource: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("parse new --json output");
    resource["id"]
        .as_str()
        .expect("resource has an id")
        .to_string()
}
