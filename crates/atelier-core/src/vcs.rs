//! Version-control adapter over libgit2.
//!
//! [`ProjectRepo`] exposes the primitives the engine composes: init, stage,
//! commit, branch bookkeeping, checkout, ref resolution and log. It applies no
//! policy. Every libgit2 failure is normalized into [`VcsError`]: either
//! `RefNotFound` (used for existence checks) or `Backend` (a hard failure).

use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    BranchType, ErrorCode, Oid, Repository, RepositoryInitOptions, Signature, Sort, Status,
    StatusOptions,
};

use crate::errors::VcsError;

type VcsResult<T> = Result<T, VcsError>;

// ============================================================================
// HeadState
// ============================================================================

/// Where HEAD points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// On a branch that has no commit yet (fresh repository).
    Unborn { branch: String },
    /// On a branch.
    Attached { branch: String, commit: Oid },
    /// Directly on a commit.
    Detached { commit: Oid },
}

impl HeadState {
    /// The commit HEAD resolves to, if any.
    pub fn commit(&self) -> Option<Oid> {
        match self {
            Self::Unborn { .. } => None,
            Self::Attached { commit, .. } | Self::Detached { commit } => Some(*commit),
        }
    }

    /// The branch HEAD is on, if any.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::Unborn { branch } | Self::Attached { branch, .. } => Some(branch),
            Self::Detached { .. } => None,
        }
    }

    /// Whether HEAD is detached.
    pub fn is_detached(&self) -> bool {
        matches!(self, Self::Detached { .. })
    }
}

// ============================================================================
// CommitInfo
// ============================================================================

/// Commit metadata read from the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub oid: Oid,
    pub parents: Vec<Oid>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Author time, seconds since the Unix epoch.
    pub time: i64,
    /// Author timezone offset in minutes east of UTC.
    pub offset_minutes: i32,
}

impl CommitInfo {
    fn from_commit(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let when = author.when();
        Self {
            oid: commit.id(),
            parents: commit.parent_ids().collect(),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
            author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
            time: when.seconds(),
            offset_minutes: when.offset_minutes(),
        }
    }
}

// ============================================================================
// ProjectRepo
// ============================================================================

/// A project's repository, rooted at the project directory.
pub struct ProjectRepo {
    repo: Repository,
    root: PathBuf,
}

impl std::fmt::Debug for ProjectRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectRepo").field("root", &self.root).finish()
    }
}

fn is_missing(err: &git2::Error) -> bool {
    matches!(
        err.code(),
        ErrorCode::NotFound
            | ErrorCode::UnbornBranch
            | ErrorCode::InvalidSpec
            | ErrorCode::Ambiguous
            | ErrorCode::Peel
    )
}

impl ProjectRepo {
    /// Initialize a repository whose first branch is `initial_branch`.
    pub fn init(root: &Path, initial_branch: &str) -> VcsResult<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(initial_branch);
        let repo = Repository::init_opts(root, &opts).map_err(VcsError::backend("init"))?;
        Ok(Self {
            repo,
            root: root.to_path_buf(),
        })
    }

    /// Open an existing repository.
    pub fn open(root: &Path) -> VcsResult<Self> {
        let repo = Repository::open(root).map_err(VcsError::backend("open"))?;
        Ok(Self {
            repo,
            root: root.to_path_buf(),
        })
    }

    /// Repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ------------------------------------------------------------------------
    // Working tree
    // ------------------------------------------------------------------------

    /// Paths whose working-tree state differs from HEAD: added, modified or
    /// deleted, staged or not. Ignored files are excluded. Sorted.
    pub fn modified_paths(&self) -> VcsResult<Vec<String>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .include_unmodified(false);
        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(VcsError::backend("status"))?;

        let mut paths: Vec<String> = statuses
            .iter()
            .filter(|entry| entry.status() != Status::CURRENT && !entry.status().is_ignored())
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Stage every modified path: add what exists, remove what was deleted.
    ///
    /// Returns the staged paths.
    pub fn stage_all(&self) -> VcsResult<Vec<String>> {
        let paths = self.modified_paths()?;
        let mut index = self.repo.index().map_err(VcsError::backend("index"))?;
        for path in &paths {
            let relative = Path::new(path);
            if self.root.join(relative).symlink_metadata().is_ok() {
                index.add_path(relative).map_err(VcsError::backend("stage"))?;
            } else {
                index
                    .remove_path(relative)
                    .map_err(VcsError::backend("stage deletion"))?;
            }
        }
        index.write().map_err(VcsError::backend("write index"))?;
        Ok(paths)
    }

    // ------------------------------------------------------------------------
    // Refs
    // ------------------------------------------------------------------------

    /// Where HEAD currently points.
    pub fn head_state(&self) -> VcsResult<HeadState> {
        let detached = self
            .repo
            .head_detached()
            .map_err(VcsError::backend("read HEAD"))?;
        if detached {
            let commit = self
                .repo
                .head()
                .map_err(VcsError::backend("read HEAD"))?
                .target()
                .ok_or_else(|| VcsError::RefNotFound("HEAD".to_string()))?;
            return Ok(HeadState::Detached { commit });
        }

        let head = self
            .repo
            .find_reference("HEAD")
            .map_err(VcsError::backend("read HEAD"))?;
        let target = head.symbolic_target().unwrap_or_default();
        let branch = target.strip_prefix("refs/heads/").unwrap_or(target).to_string();
        match self.branch_tip(&branch)? {
            Some(commit) => Ok(HeadState::Attached { branch, commit }),
            None => Ok(HeadState::Unborn { branch }),
        }
    }

    /// The name of the current branch, or `None` when detached.
    pub fn current_branch(&self) -> VcsResult<Option<String>> {
        Ok(self.head_state()?.branch().map(str::to_string))
    }

    /// Tip of a local branch, `None` if the branch does not exist or is unborn.
    pub fn branch_tip(&self, branch: &str) -> VcsResult<Option<Oid>> {
        match self.repo.find_branch(branch, BranchType::Local) {
            Ok(found) => Ok(found.get().target()),
            Err(err) if is_missing(&err) => Ok(None),
            Err(err) => Err(VcsError::backend("find branch")(err)),
        }
    }

    /// Resolve a sha, abbreviated sha or ref name to a commit.
    pub fn resolve(&self, spec: &str) -> VcsResult<Oid> {
        let object = self.repo.revparse_single(spec).map_err(|err| {
            if is_missing(&err) {
                VcsError::RefNotFound(spec.to_string())
            } else {
                VcsError::backend("resolve ref")(err)
            }
        })?;
        let commit = object.peel_to_commit().map_err(|err| {
            if is_missing(&err) || err.code() == ErrorCode::GenericError {
                VcsError::RefNotFound(spec.to_string())
            } else {
                VcsError::backend("resolve ref")(err)
            }
        })?;
        Ok(commit.id())
    }

    /// Create (or move) a local branch to `target`.
    pub fn create_branch(&self, branch: &str, target: Oid) -> VcsResult<()> {
        let commit = self
            .repo
            .find_commit(target)
            .map_err(VcsError::backend("create branch"))?;
        self.repo
            .branch(branch, &commit, true)
            .map_err(VcsError::backend("create branch"))?;
        Ok(())
    }

    /// Delete a local branch. Missing branches are not an error.
    pub fn delete_branch(&self, branch: &str) -> VcsResult<()> {
        match self.repo.find_branch(branch, BranchType::Local) {
            Ok(mut found) => found.delete().map_err(VcsError::backend("delete branch")),
            Err(err) if is_missing(&err) => Ok(()),
            Err(err) => Err(VcsError::backend("delete branch")(err)),
        }
    }

    /// Rename a local branch, replacing any branch already called `to`.
    pub fn rename_branch(&self, from: &str, to: &str) -> VcsResult<()> {
        let mut found = self
            .repo
            .find_branch(from, BranchType::Local)
            .map_err(|err| {
                if is_missing(&err) {
                    VcsError::RefNotFound(from.to_string())
                } else {
                    VcsError::backend("rename branch")(err)
                }
            })?;
        found
            .rename(to, true)
            .map_err(VcsError::backend("rename branch"))?;
        Ok(())
    }

    /// Point HEAD at a branch without touching the working tree.
    pub fn set_head_to_branch(&self, branch: &str) -> VcsResult<()> {
        self.repo
            .set_head(&format!("refs/heads/{}", branch))
            .map_err(VcsError::backend("set HEAD"))
    }

    // ------------------------------------------------------------------------
    // Commit & checkout
    // ------------------------------------------------------------------------

    /// Commit the index on top of HEAD and advance whatever HEAD points at.
    ///
    /// The commit is created even when the tree equals the parent's tree.
    pub fn commit(&self, author_name: &str, author_email: &str, message: &str) -> VcsResult<Oid> {
        let signature =
            Signature::now(author_name, author_email).map_err(VcsError::backend("signature"))?;
        let mut index = self.repo.index().map_err(VcsError::backend("index"))?;
        let tree_oid = index.write_tree().map_err(VcsError::backend("write tree"))?;
        let tree = self
            .repo
            .find_tree(tree_oid)
            .map_err(VcsError::backend("write tree"))?;

        let parent = match self.head_state()?.commit() {
            Some(oid) => Some(
                self.repo
                    .find_commit(oid)
                    .map_err(VcsError::backend("read parent"))?,
            ),
            None => None,
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .map_err(VcsError::backend("commit"))
    }

    /// Force the working tree back to HEAD, removing untracked files.
    pub fn discard_changes(&self) -> VcsResult<()> {
        self.repo
            .checkout_head(Some(&mut force_checkout()))
            .map_err(VcsError::backend("discard changes"))
    }

    /// Switch to a branch, forcing the working tree to its tip.
    pub fn checkout_branch(&self, branch: &str) -> VcsResult<()> {
        self.set_head_to_branch(branch)?;
        self.repo
            .checkout_head(Some(&mut force_checkout()))
            .map_err(VcsError::backend("checkout branch"))
    }

    /// Detach HEAD at `target`, forcing the working tree to its tree.
    pub fn checkout_detached(&self, target: Oid) -> VcsResult<()> {
        let commit = self.repo.find_commit(target).map_err(|err| {
            if is_missing(&err) {
                VcsError::RefNotFound(target.to_string())
            } else {
                VcsError::backend("checkout commit")(err)
            }
        })?;
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut force_checkout()))
            .map_err(VcsError::backend("checkout commit"))?;
        self.repo
            .set_head_detached(target)
            .map_err(VcsError::backend("detach HEAD"))
    }

    // ------------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------------

    /// Read one commit.
    pub fn read_commit(&self, oid: Oid) -> VcsResult<CommitInfo> {
        let commit = self.repo.find_commit(oid).map_err(|err| {
            if is_missing(&err) {
                VcsError::RefNotFound(oid.to_string())
            } else {
                VcsError::backend("read commit")(err)
            }
        })?;
        Ok(CommitInfo::from_commit(&commit))
    }

    /// Walk history backward from `from`, newest first, at most `depth` commits.
    pub fn log(&self, from: Oid, depth: Option<usize>) -> VcsResult<Vec<CommitInfo>> {
        let mut walk = self.repo.revwalk().map_err(VcsError::backend("log"))?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
            .map_err(VcsError::backend("log"))?;
        walk.push(from).map_err(VcsError::backend("log"))?;

        let mut commits = Vec::new();
        for oid in walk.take(depth.unwrap_or(usize::MAX)) {
            let oid = oid.map_err(VcsError::backend("log"))?;
            commits.push(self.read_commit(oid)?);
        }
        Ok(commits)
    }

    /// Whether `ancestor` is `descendant` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> VcsResult<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        self.repo
            .graph_descendant_of(descendant, ancestor)
            .map_err(VcsError::backend("ancestry"))
    }

    /// Tree of a commit.
    pub fn tree_of(&self, oid: Oid) -> VcsResult<Oid> {
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(VcsError::backend("read commit"))?;
        Ok(commit.tree_id())
    }
}

fn force_checkout() -> CheckoutBuilder<'static> {
    let mut builder = CheckoutBuilder::new();
    builder.force().remove_untracked(true);
    builder
}

// ============================================================================
// Tests
// ============================================================================
