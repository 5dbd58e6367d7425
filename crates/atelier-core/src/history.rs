//! Read-only commit history queries.
//!
//! History is always reported newest first (topological, then by time).
//! Each query runs under the project's read lock.

use chrono::{DateTime, FixedOffset};
use git2::Oid;
use serde::Serialize;

use crate::constants::MAIN_BRANCH;
use crate::engine::ProjectEngine;
use crate::errors::{AtelierError, VcsError};
use crate::project::{CommitSha, ProjectId};
use crate::vcs::{CommitInfo, ProjectRepo};

/// Resource type name of commits in resource representations.
pub const COMMITS_TYPE: &str = "commits";

// ============================================================================
// Commit
// ============================================================================

/// One commit of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    sha: CommitSha,
    project_id: ProjectId,
    branch: Option<String>,
    parents: Vec<CommitSha>,
    message: String,
    author_name: String,
    author_email: String,
    timestamp: i64,
    timezone_offset: i32,
}

impl Commit {
    fn from_info(project_id: &ProjectId, info: CommitInfo, branch: Option<String>) -> Self {
        Self {
            sha: info.oid.into(),
            project_id: project_id.clone(),
            branch,
            parents: info.parents.into_iter().map(CommitSha::from).collect(),
            message: info.message,
            author_name: info.author_name,
            author_email: info.author_email,
            timestamp: info.time,
            timezone_offset: info.offset_minutes,
        }
    }

    pub fn sha(&self) -> &CommitSha {
        &self.sha
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// `main` when the commit is on the main line, `None` for commits a
    /// rewrite has left behind.
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// Parent shas, first parent first. Empty for the initial commit.
    pub fn parents(&self) -> &[CommitSha] {
        &self.parents
    }

    /// First parent, if any.
    pub fn parent(&self) -> Option<&CommitSha> {
        self.parents.first()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn author_name(&self) -> &str {
        &self.author_name
    }

    pub fn author_email(&self) -> &str {
        &self.author_email
    }

    /// Author time, seconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Author timezone, minutes east of UTC.
    pub fn timezone_offset(&self) -> i32 {
        self.timezone_offset
    }

    /// Author time in the author's timezone.
    pub fn authored_at(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.timezone_offset.checked_mul(60)?)?;
        DateTime::from_timestamp(self.timestamp, 0).map(|utc| utc.with_timezone(&offset))
    }

    /// Render the resource representation (`{id, type, attributes}`).
    pub fn to_resource(&self) -> CommitResource {
        CommitResource {
            id: self.sha.clone(),
            resource_type: COMMITS_TYPE,
            attributes: CommitAttributes {
                project_id: self.project_id.clone(),
                branch: self.branch.clone(),
                parent_commit_id: self.parent().cloned(),
                parents: self.parents.clone(),
                author_name: self.author_name.clone(),
                author_email: self.author_email.clone(),
                message: self.message.clone(),
                timestamp: self.timestamp,
                timezone_offset: self.timezone_offset,
            },
        }
    }
}

/// Resource representation of a commit.
#[derive(Debug, Clone, Serialize)]
pub struct CommitResource {
    pub id: CommitSha,
    #[serde(rename = "type")]
    pub resource_type: &'static str,
    pub attributes: CommitAttributes,
}

/// Attributes of a commit resource.
#[derive(Debug, Clone, Serialize)]
pub struct CommitAttributes {
    pub project_id: ProjectId,
    pub branch: Option<String>,
    pub parent_commit_id: Option<CommitSha>,
    pub parents: Vec<CommitSha>,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub timestamp: i64,
    pub timezone_offset: i32,
}

// ============================================================================
// CommitHistory
// ============================================================================

/// History queries over the projects of one engine.
///
/// Obtained from [`ProjectEngine::history`].
#[derive(Debug, Clone, Copy)]
pub struct CommitHistory<'a> {
    engine: &'a ProjectEngine,
}

impl<'a> CommitHistory<'a> {
    pub(crate) fn new(engine: &'a ProjectEngine) -> Self {
        Self { engine }
    }

    /// Every commit on the main line, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::ProjectNotFound`] for an unknown project.
    pub fn all(&self, project: &ProjectId) -> Result<Vec<Commit>, AtelierError> {
        self.engine.with_repo(project, |repo, layout| {
            let Some(tip) = repo
                .branch_tip(MAIN_BRANCH)
                .map_err(|e| AtelierError::versioning(layout.root(), e))?
            else {
                return Ok(Vec::new());
            };
            let log = repo
                .log(tip, None)
                .map_err(|e| AtelierError::versioning(layout.root(), e))?;
            Ok(log
                .into_iter()
                .map(|info| Commit::from_info(project, info, Some(MAIN_BRANCH.to_string())))
                .collect())
        })
    }

    /// The first `limit` commits walking backward from `from` (the main line
    /// tip when `None`), newest first.
    ///
    /// A limit beyond the length of history returns the whole history.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::RefNotFound`] if `from` does not resolve.
    pub fn recent(
        &self,
        project: &ProjectId,
        limit: usize,
        from: Option<&str>,
    ) -> Result<Vec<Commit>, AtelierError> {
        let from = from.unwrap_or(MAIN_BRANCH);
        self.engine.with_repo(project, |repo, layout| {
            let start = repo.resolve(from).map_err(|err| match err {
                VcsError::RefNotFound(_) => AtelierError::RefNotFound {
                    project: project.clone(),
                    reference: from.to_string(),
                },
                other => AtelierError::versioning(layout.root(), other),
            })?;
            let versioning = |e| AtelierError::versioning(layout.root(), e);
            let main_tip = repo.branch_tip(MAIN_BRANCH).map_err(versioning)?;
            let log = repo.log(start, Some(limit)).map_err(versioning)?;

            let mut commits = Vec::with_capacity(log.len());
            for info in log {
                let branch = main_branch_of(repo, info.oid, main_tip).map_err(versioning)?;
                commits.push(Commit::from_info(project, info, branch));
            }
            Ok(commits)
        })
    }

    /// Fetch one commit by full or abbreviated sha.
    ///
    /// Returns `Ok(None)` if no such commit exists. Ref names are not
    /// accepted here.
    pub fn by_id(&self, project: &ProjectId, sha: &str) -> Result<Option<Commit>, AtelierError> {
        if !looks_like_sha(sha) {
            return Ok(None);
        }
        self.engine.with_repo(project, |repo, layout| {
            let versioning = |e| AtelierError::versioning(layout.root(), e);
            let oid = match repo.resolve(sha) {
                Ok(oid) => oid,
                Err(VcsError::RefNotFound(_)) => return Ok(None),
                Err(other) => return Err(versioning(other)),
            };
            let info = repo.read_commit(oid).map_err(versioning)?;
            let main_tip = repo.branch_tip(MAIN_BRANCH).map_err(versioning)?;
            let branch = main_branch_of(repo, oid, main_tip).map_err(versioning)?;
            Ok(Some(Commit::from_info(project, info, branch)))
        })
    }

    /// Fetch one commit, treating absence as [`AtelierError::CommitNotFound`].
    pub fn require(&self, project: &ProjectId, sha: &str) -> Result<Commit, AtelierError> {
        self.by_id(project, sha)?
            .ok_or_else(|| AtelierError::CommitNotFound {
                project: project.clone(),
                sha: sha.to_string(),
            })
    }

    /// Whether a commit exists in the project's repository.
    pub fn exists(&self, project: &ProjectId, sha: &str) -> Result<bool, AtelierError> {
        Ok(self.by_id(project, sha)?.is_some())
    }
}

fn main_branch_of(
    repo: &ProjectRepo,
    oid: Oid,
    main_tip: Option<Oid>,
) -> Result<Option<String>, VcsError> {
    match main_tip {
        Some(tip) if repo.is_ancestor(oid, tip)? => Ok(Some(MAIN_BRANCH.to_string())),
        _ => Ok(None),
    }
}

fn looks_like_sha(sha: &str) -> bool {
    (4..=40).contains(&sha.len()) && sha.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_looks_like_sha() {
        assert!(looks_like_sha("abcd"));
        assert!(looks_like_sha(&"a".repeat(40)));
        assert!(!looks_like_sha("abc"));
        assert!(!looks_like_sha("main"));
        assert!(!looks_like_sha(&"a".repeat(41)));
    }

    #[test]
    fn test_history_queries() {
        let temp = TempDir::new().unwrap();
        let engine = ProjectEngine::at(temp.path()).unwrap();
        let mut project = engine.make("History").unwrap();
        let initial = project.latest_commit().clone();
        engine.set_canvas(&mut project, json!({"n": 1})).unwrap();
        let second = engine.commit(&mut project, "", "", "second").unwrap();
        let history = engine.history();

        let all = history.all(project.id()).unwrap();
        let shas: Vec<&CommitSha> = all.iter().map(Commit::sha).collect();
        assert_eq!(shas, vec![&second, &initial]);
        assert_eq!(all[0].parent(), Some(&initial));
        assert!(all[1].parents().is_empty());

        assert_eq!(history.recent(project.id(), 1, None).unwrap().len(), 1);
        assert_eq!(history.recent(project.id(), 50, None).unwrap().len(), 2);
        assert!(history.recent(project.id(), 0, None).unwrap().is_empty());
        let from_initial = history
            .recent(project.id(), 10, Some(initial.as_str()))
            .unwrap();
        assert_eq!(from_initial.len(), 1);
        assert!(history
            .recent(project.id(), 10, Some("nope"))
            .unwrap_err()
            .is_not_found());

        assert!(history.exists(project.id(), second.as_str()).unwrap());
        assert!(history.exists(project.id(), &second.as_str()[..8]).unwrap());
        assert!(!history.exists(project.id(), &"0".repeat(40)).unwrap());
        assert!(!history.exists(project.id(), "main").unwrap());
    }

    #[test]
    fn test_commit_resource_shape() {
        let temp = TempDir::new().unwrap();
        let engine = ProjectEngine::at(temp.path()).unwrap();
        let project = engine.make("Resource").unwrap();
        let commit = engine
            .history()
            .by_id(project.id(), project.latest_commit().as_str())
            .unwrap()
            .unwrap();

        let value = serde_json::to_value(commit.to_resource()).unwrap();
        assert_eq!(value["type"], "commits");
        assert_eq!(value["id"], project.latest_commit().as_str());
        assert_eq!(value["attributes"]["branch"], "main");
        assert_eq!(value["attributes"]["message"], "Initial commit");
        assert!(value["attributes"]["parent_commit_id"].is_null());
        assert_eq!(value["attributes"]["project_id"], project.id().as_str());
        assert!(commit.authored_at().is_some());
    }

    #[test]
    fn test_require_missing_commit() {
        let temp = TempDir::new().unwrap();
        let engine = ProjectEngine::at(temp.path()).unwrap();
        let project = engine.make("Lookup").unwrap();
        let history = engine.history();

        let found = history
            .require(project.id(), project.latest_commit().as_str())
            .unwrap();
        assert_eq!(found.sha(), project.latest_commit());

        let missing = "0".repeat(40);
        let err = history.require(project.id(), &missing).unwrap_err();
        assert!(matches!(
            &err,
            AtelierError::CommitNotFound { sha, .. } if *sha == missing
        ));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unknown_project_is_not_found() {
        let temp = TempDir::new().unwrap();
        let engine = ProjectEngine::at(temp.path()).unwrap();
        let err = engine.history().all(&ProjectId::generate()).unwrap_err();
        assert!(err.is_not_found());
    }
}
