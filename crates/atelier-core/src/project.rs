//! Project data model.
//!
//! A [`Project`] is a snapshot assembled from three sources of truth: the
//! registry entry (name, port range), the state documents on disk (canvas,
//! workflow) and the project's repository (current and latest commit,
//! uncommitted changes). Nothing here is cached between calls.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{CANVAS_FILENAME, NOTEBOOKS_DIR, STATE_DIR, WORKFLOW_FILENAME};
use crate::errors::AtelierError;
use crate::registry::PortRange;
use crate::state_files::StateDocument;

/// Resource type name of projects in resource representations.
pub const PROJECTS_TYPE: &str = "projects";

// ============================================================================
// ProjectId
// ============================================================================

/// A unique, immutable project identifier.
///
/// IDs are UUID v4 values rendered as 32 lowercase hex characters (no
/// hyphens). Because the project directory is derived from the ID, anything
/// else is rejected so an ID can never name a path outside the projects root.
///
/// # Example
///
/// ```
/// use atelier_core::ProjectId;
///
/// let id = ProjectId::generate();
/// assert_eq!(id.as_str().len(), 32);
/// assert!(ProjectId::parse("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Generate a fresh ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse and validate a caller-supplied ID.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::ProjectNotFound`]: a malformed ID cannot name
    /// any project, so it is reported the same way as an unknown one.
    pub fn parse(id: &str) -> Result<Self, AtelierError> {
        if is_valid_project_id(id) {
            Ok(Self(id.to_string()))
        } else {
            Err(AtelierError::ProjectNotFound(id.to_string()))
        }
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Check whether a string is a well-formed project ID.
pub fn is_valid_project_id(id: &str) -> bool {
    id.len() == 32 && id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = AtelierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// CommitSha
// ============================================================================

/// A commit identifier as reported on a [`Project`].
///
/// Holds a full hex sha, or the `unversioned` sentinel for a repository
/// whose HEAD has no commit yet (only observable if `make` was interrupted
/// before its initial commit).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitSha(String);

impl CommitSha {
    const UNVERSIONED: &'static str = "unversioned";

    /// Wrap a sha string.
    pub fn new(sha: impl Into<String>) -> Self {
        Self(sha.into())
    }

    /// The sentinel for "no commit yet".
    pub fn unversioned() -> Self {
        Self(Self::UNVERSIONED.to_string())
    }

    /// Whether this is the "no commit yet" sentinel.
    pub fn is_unversioned(&self) -> bool {
        self.0 == Self::UNVERSIONED
    }

    /// Get the sha as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<git2::Oid> for CommitSha {
    fn from(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }
}

impl std::fmt::Display for CommitSha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CommitSha {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// ProjectLayout
// ============================================================================

/// On-disk layout of one project, a pure function of the projects root and ID.
///
/// ```text
/// <root>/<id>/               repository root
/// <root>/<id>/.state/        canvas.json, workflow.json
/// <root>/<id>/notebooks/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Compute the layout of project `id` under `projects_dir`.
    pub fn new(projects_dir: &Path, id: &ProjectId) -> Self {
        Self {
            root: projects_dir.join(id.as_str()),
        }
    }

    /// The project directory, which is also the repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the state documents.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// Directory holding notebooks.
    pub fn notebooks_dir(&self) -> PathBuf {
        self.root.join(NOTEBOOKS_DIR)
    }

    /// Path to `canvas.json`.
    pub fn canvas_path(&self) -> PathBuf {
        self.state_dir().join(CANVAS_FILENAME)
    }

    /// Path to `workflow.json`.
    pub fn workflow_path(&self) -> PathBuf {
        self.state_dir().join(WORKFLOW_FILENAME)
    }

    /// Scratch path for staging a write of `file_name`.
    ///
    /// It sits next to the project directory, outside the working tree, so
    /// an interrupted write never shows up as a change to commit.
    pub fn scratch_path(&self, file_name: &str) -> PathBuf {
        let id = self
            .root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.root
            .with_file_name(format!(".{}.{}.tmp", id, file_name))
    }

    /// Create the state and notebooks directories if missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.state_dir())?;
        std::fs::create_dir_all(self.notebooks_dir())
    }
}

// ============================================================================
// Project
// ============================================================================

/// A snapshot of one project.
///
/// Mutating engine operations take `&mut Project` and keep the snapshot in
/// step with what they wrote; the engine itself re-reads disk state on every
/// call and never trusts a snapshot for correctness.
#[derive(Debug, Clone)]
pub struct Project {
    pub(crate) id: ProjectId,
    pub(crate) name: String,
    pub(crate) layout: ProjectLayout,
    pub(crate) port_range: PortRange,
    pub(crate) canvas: StateDocument,
    pub(crate) workflow: StateDocument,
    pub(crate) current_commit: CommitSha,
    pub(crate) latest_commit: CommitSha,
    pub(crate) has_uncommitted_changes: bool,
}

impl Project {
    /// The immutable project ID.
    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Project directory (repository root).
    pub fn path(&self) -> &Path {
        self.layout.root()
    }

    /// Notebooks directory.
    pub fn notebooks_dir(&self) -> PathBuf {
        self.layout.notebooks_dir()
    }

    /// The on-disk layout.
    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Ports reserved for this project.
    pub fn port_range(&self) -> PortRange {
        self.port_range
    }

    /// The canvas document as last read or written.
    pub fn canvas(&self) -> &StateDocument {
        &self.canvas
    }

    /// The workflow document as last read or written.
    pub fn workflow(&self) -> &StateDocument {
        &self.workflow
    }

    /// The commit HEAD points at.
    pub fn current_commit(&self) -> &CommitSha {
        &self.current_commit
    }

    /// The tip of the main line.
    pub fn latest_commit(&self) -> &CommitSha {
        &self.latest_commit
    }

    /// Whether the working tree differed from HEAD when last observed.
    pub fn has_uncommitted_changes(&self) -> bool {
        self.has_uncommitted_changes
    }

    /// Whether the project is sitting on a historical commit.
    pub fn is_time_travelling(&self) -> bool {
        self.current_commit != self.latest_commit
    }

    /// Render the resource representation (`{id, type, attributes}`).
    pub fn to_resource(&self) -> ProjectResource {
        ProjectResource {
            id: self.id.clone(),
            resource_type: PROJECTS_TYPE,
            attributes: ProjectAttributes {
                name: self.name.clone(),
                path: self.path().to_path_buf(),
                canvas: self.canvas.clone(),
                workflow: self.workflow.clone(),
                notebooks_dir: self.notebooks_dir(),
                current_commit: self.current_commit.clone(),
                latest_commit: self.latest_commit.clone(),
                has_uncommitted_changes: self.has_uncommitted_changes,
                port_range: self.port_range,
            },
        }
    }
}

/// Resource representation of a project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectResource {
    /// Project ID.
    pub id: ProjectId,
    /// Always `projects`.
    #[serde(rename = "type")]
    pub resource_type: &'static str,
    /// Attribute object.
    pub attributes: ProjectAttributes,
}

/// Attributes of a project resource.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectAttributes {
    pub name: String,
    pub path: PathBuf,
    pub canvas: StateDocument,
    pub workflow: StateDocument,
    pub notebooks_dir: PathBuf,
    pub current_commit: CommitSha,
    pub latest_commit: CommitSha,
    pub has_uncommitted_changes: bool,
    pub port_range: PortRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_unique() {
        let a = ProjectId::generate();
        let b = ProjectId::generate();
        assert!(is_valid_project_id(a.as_str()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_project_id_rejects_paths_and_uppercase() {
        assert!(ProjectId::parse("").is_err());
        assert!(ProjectId::parse("../../../../etc/passwd").is_err());
        assert!(ProjectId::parse("0123456789ABCDEF0123456789abcdef").is_err());
        assert!(ProjectId::parse("0123456789abcdef0123456789abcdef").is_ok());
    }

    #[test]
    fn test_invalid_id_is_not_found_kind() {
        let err = ProjectId::parse("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_layout_paths() {
        let id = ProjectId::parse("0123456789abcdef0123456789abcdef").unwrap();
        let layout = ProjectLayout::new(Path::new("/srv/projects"), &id);
        assert_eq!(
            layout.root(),
            Path::new("/srv/projects/0123456789abcdef0123456789abcdef")
        );
        assert!(layout.canvas_path().ends_with(".state/canvas.json"));
        assert!(layout.workflow_path().ends_with(".state/workflow.json"));
        assert!(layout.notebooks_dir().ends_with("notebooks"));
    }

    #[test]
    fn test_unversioned_sentinel() {
        assert!(CommitSha::unversioned().is_unversioned());
        assert!(!CommitSha::new("abc").is_unversioned());
    }
}
