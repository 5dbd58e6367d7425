//! Atelier engine: project lifecycle, commit and checkout.
//!
//! The [`ProjectEngine`] composes the registry, the state documents and the
//! per-project repository. It owns the only policy in the system: how a
//! project is laid out, when a commit rewrites the main line, and how a
//! checkout decides between the main line and a detached commit.
//!
//! ## Locking
//!
//! Each operation runs under its project's lock (see [`crate::locks`]) for its
//! full duration. Registry read-modify-write cycles additionally serialize on
//! the registry's own mutex. Operations on different projects never block
//! each other.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::GlobalConfig;
use crate::constants::{
    DEFAULT_AUTHOR_EMAIL, DEFAULT_AUTHOR_NAME, DEFAULT_COMMIT_MESSAGE, DETACHED_COMMIT_BRANCH,
    INITIAL_COMMIT_MESSAGE, MAIN_BRANCH,
};
use crate::errors::{AtelierError, VcsError};
use crate::history::CommitHistory;
use crate::locks::ProjectLocks;
use crate::project::{CommitSha, Project, ProjectId, ProjectLayout};
use crate::registry::{ProjectRegistry, RegistryEntry};
use crate::schema::{check_identity_field, NewCommit, ProjectPatch};
use crate::state_files::{StateDocument, StateFileKind, StateFiles};
use crate::vcs::{HeadState, ProjectRepo};

// ============================================================================
// ProjectEngine
// ============================================================================

/// The main entry point for project operations.
///
/// # Construction
///
/// Use [`ProjectEngine::from_global_config`] for typical usage, or
/// [`ProjectEngine::at`] to root an engine in an explicit directory.
///
/// # Example
///
/// ```no_run
/// use atelier_core::ProjectEngine;
///
/// let engine = ProjectEngine::with_defaults()?;
/// let mut project = engine.make("demo")?;
/// engine.set_canvas(&mut project, serde_json::json!({"x": 1}))?;
/// let sha = engine.commit(&mut project, "", "", "edit")?;
/// assert_eq!(project.latest_commit(), &sha);
/// # Ok::<(), atelier_core::AtelierError>(())
/// ```
#[derive(Debug)]
pub struct ProjectEngine {
    config: GlobalConfig,
    projects_dir: PathBuf,
    registry: ProjectRegistry,
    locks: ProjectLocks,
}

/// Resolved author of a commit, checked before any I/O.
#[derive(Debug)]
struct Identity {
    name: String,
    email: String,
}

/// How a commit moves the main line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitTransition {
    /// HEAD is on the main line (or the repository is unborn): the commit
    /// advances it.
    Advance,
    /// HEAD is detached or left on the temporary branch: the commit lands
    /// on the temporary branch, which then replaces the main line.
    RewriteMain,
}

impl ProjectEngine {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create an engine from a global configuration.
    ///
    /// Creates the projects directory and an empty registry if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::InvalidConfiguration`] for unusable settings
    /// and [`AtelierError::Registry`] if the registry cannot be opened.
    pub fn from_global_config(config: GlobalConfig) -> Result<Self, AtelierError> {
        for warning in config.validate()? {
            tracing::warn!("Config warning: {}", warning);
        }
        let projects_dir = config.resolved_projects_dir()?;
        fs::create_dir_all(&projects_dir)?;
        let registry = ProjectRegistry::open(config.resolved_registry_path()?)?;
        tracing::debug!(
            projects_dir = %projects_dir.display(),
            registry = %registry.path().display(),
            "Engine ready"
        );
        Ok(Self {
            config,
            projects_dir,
            registry,
            locks: ProjectLocks::new(),
        })
    }

    /// Create an engine with the configuration at the default location.
    pub fn with_defaults() -> Result<Self, AtelierError> {
        Self::from_global_config(GlobalConfig::load_default()?)
    }

    /// Create an engine with the configuration at `path`.
    pub fn with_config(path: &Path) -> Result<Self, AtelierError> {
        Self::from_global_config(GlobalConfig::from_path(path)?)
    }

    /// Create an engine with default settings rooted at `projects_dir`.
    pub fn at(projects_dir: impl Into<PathBuf>) -> Result<Self, AtelierError> {
        Self::from_global_config(GlobalConfig::with_projects_dir(projects_dir))
    }

    /// The active configuration.
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Directory holding one subdirectory per project.
    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// The project registry.
    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    /// Read-only history queries.
    pub fn history(&self) -> CommitHistory<'_> {
        CommitHistory::new(self)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Create a project: directory tree, empty state documents, registry
    /// entry with a fresh port range, repository and initial commit.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::Creation`]. Everything created before the
    /// failure (directory, registry entry) is removed again.
    pub fn make(&self, name: &str) -> Result<Project, AtelierError> {
        let id = ProjectId::generate();
        self.locks.with_write(&id, || self.make_locked(&id, name))
    }

    fn make_locked(&self, id: &ProjectId, name: &str) -> Result<Project, AtelierError> {
        let layout = self.layout(id);
        if layout.root().exists() {
            return Err(AtelierError::Creation {
                path: layout.root().to_path_buf(),
                message: "directory already exists".to_string(),
            });
        }

        let mut registered = false;
        let result = self.create_project(id, name, &layout, &mut registered);
        match result {
            Ok(project) => {
                tracing::info!(
                    project = %id,
                    name,
                    port_range = %project.port_range,
                    "Created project"
                );
                Ok(project)
            }
            Err(err) => {
                tracing::warn!(project = %id, "Project creation failed, rolling back: {}", err);
                self.rollback_creation(id, &layout, registered);
                if matches!(err, AtelierError::Creation { .. }) {
                    Err(err)
                } else {
                    Err(AtelierError::Creation {
                        path: layout.root().to_path_buf(),
                        message: err.to_string(),
                    })
                }
            }
        }
    }

    fn create_project(
        &self,
        id: &ProjectId,
        name: &str,
        layout: &ProjectLayout,
        registered: &mut bool,
    ) -> Result<Project, AtelierError> {
        layout.ensure_dirs()?;
        StateFiles::new(layout).write_empty()?;

        let entry = self.registry.register(id, name, &self.config.ports)?;
        *registered = true;

        let repo = ProjectRepo::init(layout.root(), MAIN_BRANCH)
            .map_err(|e| AtelierError::versioning(layout.root(), e))?;
        let sha = vcs(layout, repo.stage_all().and_then(|_| {
            repo.commit(
                &self.author_name(""),
                &self.author_email(""),
                INITIAL_COMMIT_MESSAGE,
            )
        }))?;
        let sha = CommitSha::from(sha);

        Ok(Project {
            id: id.clone(),
            name: entry.name,
            layout: layout.clone(),
            port_range: entry.port_range,
            canvas: empty_document(),
            workflow: empty_document(),
            current_commit: sha.clone(),
            latest_commit: sha,
            has_uncommitted_changes: false,
        })
    }

    fn rollback_creation(&self, id: &ProjectId, layout: &ProjectLayout, registered: bool) {
        if layout.root().exists() {
            if let Err(err) = fs::remove_dir_all(layout.root()) {
                tracing::warn!(
                    "Failed to remove partially created project at {}: {}",
                    layout.root().display(),
                    err
                );
            }
        }
        if registered {
            if let Err(err) = self.registry.remove(id) {
                tracing::warn!(project = %id, "Failed to remove registry entry: {}", err);
            }
        }
    }

    /// Load a project, or `None` if it is not registered.
    ///
    /// # Errors
    ///
    /// Returns a versioning error if the project is registered but its
    /// directory, state documents or repository cannot be read.
    pub fn get(&self, id: &ProjectId) -> Result<Option<Project>, AtelierError> {
        self.locks.with_read(id, || match self.registry.find(id)? {
            Some(entry) => self.load(entry).map(Some),
            None => Ok(None),
        })
    }

    /// Load a project, treating absence as [`AtelierError::ProjectNotFound`].
    pub fn require(&self, id: &ProjectId) -> Result<Project, AtelierError> {
        self.get(id)?
            .ok_or_else(|| AtelierError::ProjectNotFound(id.to_string()))
    }

    /// Registry membership check. Does not touch the project directory.
    pub fn exists(&self, id: &ProjectId) -> Result<bool, AtelierError> {
        self.registry.contains(id)
    }

    /// Load every registered project, in registration order.
    ///
    /// Projects whose directory has vanished are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Project>, AtelierError> {
        let entries = self.registry.entries()?;
        let loaded: Vec<Option<Project>> = entries
            .into_par_iter()
            .map(|entry| {
                let id = entry.id.clone();
                self.locks.with_read(&id, || {
                    let layout = self.layout(&id);
                    if !layout.root().is_dir() {
                        tracing::warn!(
                            project = %id,
                            "Skipping registered project without a directory at {}",
                            layout.root().display()
                        );
                        return Ok(None);
                    }
                    self.load(entry).map(Some)
                })
            })
            .collect::<Result<_, AtelierError>>()?;
        Ok(loaded.into_iter().flatten().collect())
    }

    /// Remove the project directory and its registry entry. Not undoable.
    pub fn delete(&self, project: Project) -> Result<(), AtelierError> {
        self.locks.with_write(&project.id, || {
            self.ensure_registered(&project.id)?;
            match fs::remove_dir_all(project.path()) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("Project directory already gone: {}", project.path().display());
                }
                Err(err) => return Err(err.into()),
            }
            self.registry.remove(&project.id)?;
            tracing::info!(project = %project.id, "Deleted project");
            Ok(())
        })
    }

    // -------------------------------------------------------------------------
    // Attributes & state documents
    // -------------------------------------------------------------------------

    /// Change the display name. Does not commit.
    pub fn rename(&self, project: &mut Project, name: &str) -> Result<(), AtelierError> {
        let id = project.id.clone();
        self.locks.with_write(&id, || self.rename_locked(project, name))
    }

    fn rename_locked(&self, project: &mut Project, name: &str) -> Result<(), AtelierError> {
        if !self.registry.rename(&project.id, name)? {
            return Err(AtelierError::ProjectNotFound(project.id.to_string()));
        }
        tracing::debug!(project = %project.id, name, "Renamed project");
        project.name = name.to_string();
        Ok(())
    }

    /// Overwrite the canvas document. Does not commit.
    pub fn set_canvas(&self, project: &mut Project, doc: StateDocument) -> Result<(), AtelierError> {
        self.set_document(project, StateFileKind::Canvas, doc)
    }

    /// Overwrite the workflow document. Does not commit.
    pub fn set_workflow(
        &self,
        project: &mut Project,
        doc: StateDocument,
    ) -> Result<(), AtelierError> {
        self.set_document(project, StateFileKind::Workflow, doc)
    }

    fn set_document(
        &self,
        project: &mut Project,
        kind: StateFileKind,
        doc: StateDocument,
    ) -> Result<(), AtelierError> {
        let id = project.id.clone();
        self.locks.with_write(&id, || {
            self.ensure_registered(&id)?;
            self.write_document_locked(project, kind, doc)?;
            self.refresh_changes(project)
        })
    }

    fn write_document_locked(
        &self,
        project: &mut Project,
        kind: StateFileKind,
        doc: StateDocument,
    ) -> Result<(), AtelierError> {
        StateFiles::new(&project.layout).write(kind, &doc)?;
        tracing::debug!(project = %project.id, %kind, "Wrote state document");
        match kind {
            StateFileKind::Canvas => project.canvas = doc,
            StateFileKind::Workflow => project.workflow = doc,
        }
        Ok(())
    }

    /// Apply a validated attribute patch in one critical section.
    ///
    /// A `current_commit` change is a checkout and runs first: an unknown
    /// ref fails the patch before anything else is written, and documents in
    /// the same patch survive the checkout.
    pub fn update(&self, project: &mut Project, patch: ProjectPatch) -> Result<(), AtelierError> {
        if patch.is_empty() {
            return Ok(());
        }
        let id = project.id.clone();
        self.locks.with_write(&id, || {
            self.ensure_registered(&id)?;

            if let Some(reference) = &patch.current_commit {
                self.checkout_locked(project, reference)?;
            }
            if let Some(name) = &patch.name {
                self.rename_locked(project, name)?;
            }
            if let Some(canvas) = patch.canvas {
                self.write_document_locked(project, StateFileKind::Canvas, canvas)?;
            }
            if let Some(workflow) = patch.workflow {
                self.write_document_locked(project, StateFileKind::Workflow, workflow)?;
            }
            self.refresh_changes(project)
        })
    }

    // -------------------------------------------------------------------------
    // Versioning
    // -------------------------------------------------------------------------

    /// Commit every working-tree change.
    ///
    /// Empty author fields and an empty message fall back to the configured
    /// defaults. Committing from a historical commit rewrites the main line:
    /// the new commit's parent is that commit and it becomes the main tip.
    /// After any commit the repository is on the main line.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::InvalidAttribute`] for an author name or email
    /// containing angle brackets or line breaks. Nothing is staged then.
    pub fn commit(
        &self,
        project: &mut Project,
        author_name: &str,
        author_email: &str,
        message: &str,
    ) -> Result<CommitSha, AtelierError> {
        let signature = Identity {
            name: self.author_name(author_name),
            email: self.author_email(author_email),
        };
        check_identity_field("author_name", &signature.name)?;
        check_identity_field("author_email", &signature.email)?;
        let message = self.commit_message(message);

        let id = project.id.clone();
        self.locks.with_write(&id, || {
            self.ensure_registered(&id)?;
            self.commit_locked(project, &signature, &message)
        })
    }

    /// [`ProjectEngine::commit`] driven by a validated commit request.
    pub fn commit_request(
        &self,
        project: &mut Project,
        request: &NewCommit,
    ) -> Result<CommitSha, AtelierError> {
        self.commit(
            project,
            request.author_name.as_deref().unwrap_or_default(),
            request.author_email.as_deref().unwrap_or_default(),
            &request.message,
        )
    }

    fn commit_locked(
        &self,
        project: &mut Project,
        signature: &Identity,
        message: &str,
    ) -> Result<CommitSha, AtelierError> {
        let layout = &project.layout;
        let repo = self.open_repo(layout)?;

        let staged = vcs(layout, repo.stage_all())?;
        tracing::debug!(project = %project.id, paths = staged.len(), "Staged changes");

        let transition = match vcs(layout, repo.head_state())? {
            HeadState::Detached { commit } => {
                tracing::debug!(
                    project = %project.id,
                    from = %commit,
                    "Committing from a detached HEAD"
                );
                vcs(layout, repo.create_branch(DETACHED_COMMIT_BRANCH, commit))?;
                vcs(layout, repo.set_head_to_branch(DETACHED_COMMIT_BRANCH))?;
                CommitTransition::RewriteMain
            }
            HeadState::Attached { branch, .. } if branch == DETACHED_COMMIT_BRANCH => {
                tracing::debug!(project = %project.id, "Resuming an interrupted main line rewrite");
                CommitTransition::RewriteMain
            }
            HeadState::Attached { .. } | HeadState::Unborn { .. } => CommitTransition::Advance,
        };

        let oid = vcs(
            layout,
            repo.commit(&signature.name, &signature.email, message),
        )?;

        if transition == CommitTransition::RewriteMain {
            vcs(layout, repo.delete_branch(MAIN_BRANCH))?;
            vcs(layout, repo.rename_branch(DETACHED_COMMIT_BRANCH, MAIN_BRANCH))?;
            vcs(layout, repo.set_head_to_branch(MAIN_BRANCH))?;
        }

        let sha = CommitSha::from(oid);
        project.current_commit = sha.clone();
        project.latest_commit = sha.clone();
        project.has_uncommitted_changes = !vcs(layout, repo.modified_paths())?.is_empty();
        tracing::info!(
            project = %project.id,
            commit = %sha,
            rewrote_main = transition == CommitTransition::RewriteMain,
            "Committed"
        );
        Ok(sha)
    }

    /// Discard every working-tree change and move to `reference`.
    ///
    /// `reference` may be a full or abbreviated sha or a ref name. When it
    /// resolves to the main line tip the repository lands on the main line,
    /// otherwise HEAD is detached at the commit. Canvas and workflow are
    /// re-read from the checked-out tree.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::RefNotFound`] if `reference` does not resolve;
    /// nothing is discarded in that case.
    pub fn checkout(&self, project: &mut Project, reference: &str) -> Result<(), AtelierError> {
        let id = project.id.clone();
        self.locks.with_write(&id, || {
            self.ensure_registered(&id)?;
            self.checkout_locked(project, reference)
        })
    }

    fn checkout_locked(&self, project: &mut Project, reference: &str) -> Result<(), AtelierError> {
        let layout = &project.layout;
        let repo = self.open_repo(layout)?;

        let target = repo.resolve(reference).map_err(|err| match err {
            VcsError::RefNotFound(_) => AtelierError::RefNotFound {
                project: project.id.clone(),
                reference: reference.to_string(),
            },
            other => AtelierError::versioning(layout.root(), other),
        })?;

        vcs(layout, repo.discard_changes())?;
        let latest = vcs(layout, repo.branch_tip(MAIN_BRANCH))?;
        if latest == Some(target) {
            vcs(layout, repo.checkout_branch(MAIN_BRANCH))?;
        } else {
            vcs(layout, repo.checkout_detached(target))?;
        }
        layout.ensure_dirs()?;

        let (canvas, workflow) = StateFiles::new(layout).read_all()?;
        project.canvas = canvas;
        project.workflow = workflow;
        project.current_commit = CommitSha::from(target);
        if let Some(latest) = latest {
            project.latest_commit = CommitSha::from(latest);
        }
        project.has_uncommitted_changes = !vcs(layout, repo.modified_paths())?.is_empty();
        tracing::info!(
            project = %project.id,
            commit = %project.current_commit,
            detached = project.is_time_travelling(),
            "Checked out"
        );
        Ok(())
    }

    /// Whether any path in the working tree differs from HEAD.
    pub fn has_uncommitted_changes(&self, project: &Project) -> Result<bool, AtelierError> {
        Ok(!self.modified_paths(project)?.is_empty())
    }

    /// Paths that differ from HEAD (added, modified or deleted), sorted.
    pub fn modified_paths(&self, project: &Project) -> Result<Vec<String>, AtelierError> {
        self.with_repo(&project.id, |repo, layout| vcs(layout, repo.modified_paths()))
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    pub(crate) fn layout(&self, id: &ProjectId) -> ProjectLayout {
        ProjectLayout::new(&self.projects_dir, id)
    }

    /// Run `f` on a project's repository under its read lock.
    pub(crate) fn with_repo<T>(
        &self,
        id: &ProjectId,
        f: impl FnOnce(&ProjectRepo, &ProjectLayout) -> Result<T, AtelierError>,
    ) -> Result<T, AtelierError> {
        self.locks.with_read(id, || {
            self.ensure_registered(id)?;
            let layout = self.layout(id);
            let repo = self.open_repo(&layout)?;
            f(&repo, &layout)
        })
    }

    fn ensure_registered(&self, id: &ProjectId) -> Result<(), AtelierError> {
        if self.registry.contains(id)? {
            Ok(())
        } else {
            Err(AtelierError::ProjectNotFound(id.to_string()))
        }
    }

    fn open_repo(&self, layout: &ProjectLayout) -> Result<ProjectRepo, AtelierError> {
        vcs(layout, ProjectRepo::open(layout.root()))
    }

    /// Assemble a project snapshot from disk. Caller holds the lock.
    fn load(&self, entry: RegistryEntry) -> Result<Project, AtelierError> {
        let layout = self.layout(&entry.id);
        let (canvas, workflow) = StateFiles::new(&layout).read_all()?;
        let repo = self.open_repo(&layout)?;

        let current_commit = vcs(&layout, repo.head_state())?
            .commit()
            .map(CommitSha::from)
            .unwrap_or_else(CommitSha::unversioned);
        let latest_commit = vcs(&layout, repo.branch_tip(MAIN_BRANCH))?
            .map(CommitSha::from)
            .unwrap_or_else(CommitSha::unversioned);
        let has_uncommitted_changes = !vcs(&layout, repo.modified_paths())?.is_empty();

        Ok(Project {
            id: entry.id,
            name: entry.name,
            layout,
            port_range: entry.port_range,
            canvas,
            workflow,
            current_commit,
            latest_commit,
            has_uncommitted_changes,
        })
    }

    fn refresh_changes(&self, project: &mut Project) -> Result<(), AtelierError> {
        let repo = self.open_repo(&project.layout)?;
        project.has_uncommitted_changes =
            !vcs(&project.layout, repo.modified_paths())?.is_empty();
        Ok(())
    }

    fn author_name(&self, requested: &str) -> String {
        non_blank(requested)
            .or_else(|| non_blank(&self.config.commit.author_name))
            .unwrap_or(DEFAULT_AUTHOR_NAME)
            .to_string()
    }

    fn author_email(&self, requested: &str) -> String {
        non_blank(requested)
            .or_else(|| non_blank(&self.config.commit.author_email))
            .unwrap_or(DEFAULT_AUTHOR_EMAIL)
            .to_string()
    }

    fn commit_message(&self, requested: &str) -> String {
        non_blank(requested)
            .or_else(|| non_blank(&self.config.commit.message))
            .unwrap_or(DEFAULT_COMMIT_MESSAGE)
            .to_string()
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn empty_document() -> StateDocument {
    StateDocument::Object(serde_json::Map::new())
}

/// Lift an adapter result into the engine's error type.
fn vcs<T>(layout: &ProjectLayout, result: Result<T, VcsError>) -> Result<T, AtelierError> {
    result.map_err(|e| AtelierError::versioning(layout.root(), e))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommitDefaults;
    use crate::constants::CANVAS_FILENAME;
    use crate::errors::ErrorKind;
    use crate::registry::PortRange;
    use serde_json::json;
    use tempfile::TempDir;

    fn engine(temp: &TempDir) -> ProjectEngine {
        ProjectEngine::at(temp.path().join("projects")).unwrap()
    }

    #[test]
    fn test_make_creates_layout_and_initial_commit() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let project = engine.make("Demo").unwrap();

        assert_eq!(project.name(), "Demo");
        assert_eq!(project.port_range(), PortRange(50_000, 50_099));
        assert!(project.layout().canvas_path().is_file());
        assert!(project.layout().workflow_path().is_file());
        assert!(project.notebooks_dir().is_dir());
        assert!(!project.current_commit().is_unversioned());
        assert_eq!(project.current_commit(), project.latest_commit());
        assert!(!project.has_uncommitted_changes());
        assert!(engine.exists(project.id()).unwrap());

        let commits = engine.history().all(project.id()).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message(), "Initial commit");
        assert_eq!(commits[0].author_name(), "Atelier");
    }

    #[test]
    fn test_get_unknown_is_none() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        assert!(engine.get(&ProjectId::generate()).unwrap().is_none());
        assert!(engine
            .require(&ProjectId::generate())
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_set_documents_visible_without_commit() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let mut project = engine.make("Docs").unwrap();

        engine.set_canvas(&mut project, json!({"x": 1})).unwrap();
        engine.set_canvas(&mut project, json!({"x": 2})).unwrap();
        engine
            .set_workflow(&mut project, json!({"steps": ["a"]}))
            .unwrap();
        assert!(project.has_uncommitted_changes());

        let loaded = engine.require(project.id()).unwrap();
        assert_eq!(loaded.canvas(), &json!({"x": 2}));
        assert_eq!(loaded.workflow(), &json!({"steps": ["a"]}));
        assert!(loaded.has_uncommitted_changes());
        assert_eq!(
            engine.modified_paths(&loaded).unwrap(),
            vec![".state/canvas.json", ".state/workflow.json"]
        );
    }

    #[test]
    fn test_commit_uses_configured_defaults() {
        let temp = TempDir::new().unwrap();
        let mut config = GlobalConfig::with_projects_dir(temp.path().join("projects"));
        config.commit = CommitDefaults {
            author_name: "Robot".to_string(),
            author_email: "robot@example.com".to_string(),
            message: "autosave".to_string(),
        };
        let engine = ProjectEngine::from_global_config(config).unwrap();
        let mut project = engine.make("Defaults").unwrap();

        let sha = engine.commit(&mut project, "  ", "", "").unwrap();
        let commit = engine
            .history()
            .by_id(project.id(), sha.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(commit.author_name(), "Robot");
        assert_eq!(commit.author_email(), "robot@example.com");
        assert_eq!(commit.message(), "autosave");
    }

    #[test]
    fn test_commit_request_uses_caller_identity() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let mut project = engine.make("Caller").unwrap();

        let request = NewCommit::new("by ada").author("Ada", "ada@example.com");
        let sha = engine.commit_request(&mut project, &request).unwrap();
        let commit = engine
            .history()
            .by_id(project.id(), sha.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(commit.author_name(), "Ada");
        assert_eq!(commit.message(), "by ada");
    }

    #[test]
    fn test_checkout_restores_documents_and_drops_edits() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let mut project = engine.make("Travel").unwrap();
        let initial = project.latest_commit().clone();

        engine.set_canvas(&mut project, json!({"v": 1})).unwrap();
        let s1 = engine.commit(&mut project, "", "", "v1").unwrap();
        engine.set_canvas(&mut project, json!({"v": "dirty"})).unwrap();
        fs::write(project.notebooks_dir().join("scratch.ipynb"), "{}").unwrap();

        engine.checkout(&mut project, initial.as_str()).unwrap();
        assert_eq!(project.canvas(), &json!({}));
        assert_eq!(project.current_commit(), &initial);
        assert_eq!(project.latest_commit(), &s1);
        assert!(project.is_time_travelling());
        assert!(!project.has_uncommitted_changes());
        assert!(project.notebooks_dir().is_dir());
        assert!(!project.notebooks_dir().join("scratch.ipynb").exists());

        engine.checkout(&mut project, s1.as_str()).unwrap();
        assert_eq!(project.canvas(), &json!({"v": 1}));
        assert!(!project.is_time_travelling());
    }

    #[test]
    fn test_checkout_unknown_ref_is_not_found_and_keeps_edits() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let mut project = engine.make("Refs").unwrap();
        engine.set_canvas(&mut project, json!({"keep": true})).unwrap();

        let err = engine.checkout(&mut project, "no-such-ref").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let loaded = engine.require(project.id()).unwrap();
        assert_eq!(loaded.canvas(), &json!({"keep": true}));
    }

    #[test]
    fn test_update_applies_checkout_before_documents() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let mut project = engine.make("Patch").unwrap();
        let initial = project.latest_commit().clone();
        engine.set_canvas(&mut project, json!({"v": 1})).unwrap();
        engine.commit(&mut project, "", "", "v1").unwrap();

        let patch = ProjectPatch {
            name: Some("Patched".to_string()),
            canvas: Some(json!({"v": "new"})),
            workflow: None,
            current_commit: Some(initial.to_string()),
        };
        engine.update(&mut project, patch).unwrap();

        let loaded = engine.require(project.id()).unwrap();
        assert_eq!(loaded.name(), "Patched");
        assert_eq!(loaded.current_commit(), &initial);
        assert_eq!(loaded.canvas(), &json!({"v": "new"}));
        assert!(loaded.has_uncommitted_changes());
    }

    #[test]
    fn test_rename_does_not_commit() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let mut project = engine.make("Old").unwrap();
        let before = project.latest_commit().clone();

        engine.rename(&mut project, "New").unwrap();
        let loaded = engine.require(project.id()).unwrap();
        assert_eq!(loaded.name(), "New");
        assert_eq!(loaded.latest_commit(), &before);
    }

    #[test]
    fn test_delete_then_operations_fail() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let project = engine.make("Gone").unwrap();
        let mut stale = project.clone();
        let id = project.id().clone();
        let path = project.path().to_path_buf();

        engine.delete(project).unwrap();
        assert!(!engine.exists(&id).unwrap());
        assert!(engine.get(&id).unwrap().is_none());
        assert!(!path.exists());
        assert!(engine
            .commit(&mut stale, "", "", "late")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_list_skips_vanished_directories() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let a = engine.make("A").unwrap();
        let b = engine.make("B").unwrap();
        fs::remove_dir_all(b.path()).unwrap();

        let listed = engine.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), a.id());
    }

    #[test]
    fn test_make_rolls_back_on_failure() {
        let temp = TempDir::new().unwrap();
        let mut config = GlobalConfig::with_projects_dir(temp.path().join("projects"));
        config.ports.start = u32::MAX - 7;
        config.ports.width = 5;
        let engine = ProjectEngine::from_global_config(config).unwrap();

        engine.make("first").unwrap();
        let err = engine.make("second").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Creation);
        assert_eq!(engine.registry().entries().unwrap().len(), 1);
        let dirs = fs::read_dir(engine.projects_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .count();
        assert_eq!(dirs, 1);
    }

    #[test]
    fn test_bad_author_rejected_before_touching_repository() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let mut project = engine.make("Identity").unwrap();
        let initial = project.latest_commit().clone();
        engine.set_canvas(&mut project, json!({"x": 1})).unwrap();
        let s1 = engine.commit(&mut project, "", "", "edit").unwrap();
        engine.checkout(&mut project, initial.as_str()).unwrap();
        engine.set_canvas(&mut project, json!({"y": 2})).unwrap();

        let err = engine
            .commit(&mut project, "Ada <ada>", "ada@example.com", "bad")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = engine
            .commit(&mut project, "Ada", "ada@example.com\n", "bad")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let repo = ProjectRepo::open(project.path()).unwrap();
        let head = repo.head_state().unwrap();
        assert!(head.is_detached(), "head moved: {:?}", head);
        assert_eq!(head.commit().map(CommitSha::from).as_ref(), Some(&initial));
        assert_eq!(repo.branch_tip(DETACHED_COMMIT_BRANCH).unwrap(), None);
        assert_eq!(
            repo.branch_tip(MAIN_BRANCH).unwrap().map(CommitSha::from),
            Some(s1)
        );
        // The edit is still unstaged work, not lost to a half-made commit.
        assert!(engine.has_uncommitted_changes(&project).unwrap());
    }

    #[test]
    fn test_lock_table_does_not_grow_with_lookups() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        for _ in 0..1000 {
            assert!(engine.get(&ProjectId::generate()).unwrap().is_none());
        }
        let unknown = ProjectId::generate();
        assert!(engine.history().all(&unknown).is_err());
        assert!(engine.require(&unknown).is_err());
        assert!(engine.locks.is_empty());

        let mut project = engine.make("Busy").unwrap();
        engine.set_canvas(&mut project, json!({"a": 1})).unwrap();
        engine.commit(&mut project, "", "", "one").unwrap();
        engine.list().unwrap();
        engine.delete(project).unwrap();
        assert!(engine.locks.is_empty());
    }

    #[test]
    fn test_interrupted_document_write_is_not_committed() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let mut project = engine.make("Crash").unwrap();

        // Simulate a crash between the temp write and the rename.
        let leftover = project.layout().scratch_path(CANVAS_FILENAME);
        fs::write(&leftover, "{\"half\":").unwrap();
        assert!(!leftover.starts_with(project.path()));

        assert!(!engine.has_uncommitted_changes(&project).unwrap());
        engine.commit(&mut project, "", "", "after crash").unwrap();
        let repo = ProjectRepo::open(project.path()).unwrap();
        let head = repo.head_state().unwrap().commit().unwrap();
        let parent = repo.read_commit(head).unwrap().parents[0];
        assert_eq!(repo.tree_of(head).unwrap(), repo.tree_of(parent).unwrap());
    }
}
