//! Common constants used throughout atelier-core.
//!
//! This module centralizes on-disk names, branch names and built-in defaults
//! so the engine, the registry and the CLI agree on a single layout.

// ============================================================================
// Directory Names
// ============================================================================

/// The name of the global Atelier directory.
///
/// Located at `~/.atelier/` on Unix-like systems.
pub const ATELIER_HOME_DIR: &str = ".atelier";

/// The subdirectory of the Atelier home that holds one directory per project.
pub const PROJECTS_DIR: &str = "projects";

/// The directory inside a project that holds the versioned state documents.
///
/// Layout: `<root>/<project-id>/.state/{canvas.json, workflow.json}`
pub const STATE_DIR: &str = ".state";

/// The directory inside a project that holds user notebooks.
pub const NOTEBOOKS_DIR: &str = "notebooks";

// ============================================================================
// File Names
// ============================================================================

/// File name of the canvas state document.
pub const CANVAS_FILENAME: &str = "canvas.json";

/// File name of the workflow state document.
pub const WORKFLOW_FILENAME: &str = "workflow.json";

/// File name of the process-wide project registry (a JSON array).
pub const REGISTRY_FILENAME: &str = "project_db.json";

/// The name of the global configuration file.
pub const GLOBAL_CONFIG_FILENAME: &str = "config.yaml";

// ============================================================================
// Branches
// ============================================================================

/// The main line of every project repository.
pub const MAIN_BRANCH: &str = "main";

/// Branch created while committing from a detached HEAD.
///
/// It never survives a commit: it is renamed to [`MAIN_BRANCH`] before the
/// commit operation returns.
pub const DETACHED_COMMIT_BRANCH: &str = "atelier-detached";

// ============================================================================
// Defaults
// ============================================================================

/// Author name used for system commits and when a caller supplies none.
pub const DEFAULT_AUTHOR_NAME: &str = "Atelier";

/// Author email used for system commits and when a caller supplies none.
pub const DEFAULT_AUTHOR_EMAIL: &str = "auto.commit@atelier";

/// Message used when a caller commits without one.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Auto-committed changes to files";

/// Message of the commit created by `make`.
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

/// First port of the default range handed to a new project.
pub const DEFAULT_PORT_START: u32 = 50_000;

/// Width of every allocated port range; also the scan stride.
pub const DEFAULT_PORT_WIDTH: u32 = 100;
