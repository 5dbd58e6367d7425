//! # atelier-core
//!
//! **Atelier** – versioned project workspace engine.
//!
//! Every project is a directory holding two JSON state documents (a canvas
//! and a workflow) and a notebooks tree, versioned by its own git repository.
//! A process-wide registry records which projects exist and which port range
//! each one owns.
//!
//! ## Main Types
//!
//! - [`ProjectEngine`] – lifecycle, state documents, commit and checkout
//! - [`CommitHistory`] – read-only history queries
//! - [`Project`] – a snapshot of one project
//! - [`AtelierError`] – domain-specific error type, classified by [`ErrorKind`]
//!
//! ## Modules
//!
//! - [`config`] – configuration types (GlobalConfig, CommitDefaults, PortSettings)
//! - [`engine`] – the ProjectEngine implementation
//! - [`history`] – commit queries
//! - [`registry`] – project registry and port-range allocation
//! - [`schema`] – attribute schemas for projects and commits
//! - [`state_files`] – canvas and workflow documents
//! - [`vcs`] – git adapter
//!
//! ## Example
//!
//! ```no_run
//! use atelier_core::ProjectEngine;
//! use serde_json::json;
//!
//! let engine = ProjectEngine::at("/tmp/atelier")?;
//! let mut project = engine.make("demo")?;
//! let initial = project.latest_commit().clone();
//!
//! engine.set_canvas(&mut project, json!({"x": 1}))?;
//! engine.commit(&mut project, "", "", "edit")?;
//!
//! // Go back, then rewrite the main line from there.
//! engine.checkout(&mut project, initial.as_str())?;
//! engine.commit(&mut project, "", "", "branch-forward")?;
//! # Ok::<(), atelier_core::AtelierError>(())
//! ```

// Modules
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod history;
pub mod locks;
pub mod project;
pub mod registry;
pub mod schema;
pub mod state_files;
pub mod vcs;

// Re-exports for convenience
pub use config::{CommitDefaults, GlobalConfig, PortSettings};
pub use engine::ProjectEngine;
pub use errors::{AtelierError, ErrorKind, VcsError};
pub use history::{Commit, CommitHistory, CommitResource};
pub use project::{CommitSha, Project, ProjectId, ProjectLayout, ProjectResource};
pub use registry::{PortRange, ProjectRegistry, RegistryEntry};
pub use schema::{Attributes, NewCommit, ProjectPatch};
pub use state_files::{StateDocument, StateFileKind};
