//! Error types for atelier-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::project::ProjectId;

/// Coarse classification of an [`AtelierError`].
///
/// This is the contract consumed by outer layers: an HTTP layer maps kinds to
/// status codes, the CLI maps them to messages and exit codes. The variant
/// carries the detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown project, commit or ref.
    NotFound,
    /// A required attribute is missing.
    Validation,
    /// An attribute name is not recognized for the resource.
    Forbidden,
    /// An attribute is owned by the engine and cannot be set.
    Conflict,
    /// Project creation failed.
    Creation,
    /// The repository or a state file could not be read or written.
    Versioning,
    /// Configuration could not be loaded or is invalid.
    Config,
    /// Any other I/O or serialization failure.
    Io,
}

/// Domain-specific errors for Atelier operations.
#[derive(Error, Debug)]
pub enum AtelierError {
    /// No registry entry exists for the project ID.
    #[error("Project `{0}` not found.")]
    ProjectNotFound(String),

    /// The commit does not exist in the project's repository.
    #[error("Commit `{sha}` not found in project `{project}`.")]
    CommitNotFound {
        /// The project that was searched.
        project: ProjectId,
        /// The requested sha.
        sha: String,
    },

    /// A ref (sha, abbreviated sha or branch name) could not be resolved.
    #[error("Ref `{reference}` not found in project `{project}`.")]
    RefNotFound {
        /// The project that was searched.
        project: ProjectId,
        /// The unresolved reference.
        reference: String,
    },

    /// A required attribute was not supplied.
    #[error("Missing required attribute `{attribute}` for {resource}.")]
    MissingAttribute {
        /// Resource type (e.g. `projects`).
        resource: &'static str,
        /// The missing attribute name.
        attribute: &'static str,
    },

    /// An attribute has the wrong JSON type.
    #[error("Attribute `{attribute}` of {resource} must be {expected}.")]
    InvalidAttribute {
        /// Resource type.
        resource: &'static str,
        /// Attribute name.
        attribute: String,
        /// Human-readable description of the expected type.
        expected: &'static str,
    },

    /// The attribute is not part of the resource schema.
    #[error("Unrecognized attribute `{attribute}` for {resource}.")]
    UnrecognizedAttribute {
        /// Resource type.
        resource: &'static str,
        /// The offending attribute name.
        attribute: String,
    },

    /// The attribute is computed by the engine and cannot be written.
    #[error("Attribute `{attribute}` of {resource} is read-only.")]
    ReadOnlyAttribute {
        /// Resource type.
        resource: &'static str,
        /// The offending attribute name.
        attribute: String,
    },

    /// Project creation failed (directory, registry, or initial commit).
    #[error("Failed to create project at `{path}`: {message}")]
    Creation {
        /// Project directory that was being created.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The project registry could not be read or written.
    #[error("Registry error at `{path}`: {message}")]
    Registry {
        /// Path to the registry file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A state document could not be read or written.
    #[error("State file error at `{path}`: {message}")]
    StateFile {
        /// Path to the state document.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The version-control backend failed.
    #[error("Versioning error in `{path}`: {source}")]
    Versioning {
        /// Repository root.
        path: PathBuf,
        /// Underlying adapter error.
        #[source]
        source: VcsError,
    },

    /// The configuration file is unreadable or unparsable.
    #[error("Config invalid: {0}")]
    InvalidConfig(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A wrapped generic error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AtelierError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProjectNotFound(_) | Self::CommitNotFound { .. } | Self::RefNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::MissingAttribute { .. } | Self::InvalidAttribute { .. } => ErrorKind::Validation,
            Self::UnrecognizedAttribute { .. } => ErrorKind::Forbidden,
            Self::ReadOnlyAttribute { .. } => ErrorKind::Conflict,
            Self::Creation { .. } => ErrorKind::Creation,
            Self::Registry { .. } | Self::StateFile { .. } | Self::Versioning { .. } => {
                ErrorKind::Versioning
            }
            Self::InvalidConfig(_) | Self::InvalidConfiguration { .. } => ErrorKind::Config,
            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorKind::Io,
        }
    }

    /// Whether this error means "the thing asked for does not exist".
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn versioning(path: impl Into<PathBuf>, source: VcsError) -> Self {
        Self::Versioning {
            path: path.into(),
            source,
        }
    }
}

/// Outcomes of the version-control adapter other than success.
///
/// The adapter never applies policy; it only separates "the ref does not
/// exist" from every other backend failure.
#[derive(Error, Debug)]
pub enum VcsError {
    /// The ref or object could not be resolved.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// Any other backend failure (corrupt repository, unreadable working tree).
    #[error("{operation} failed: {source}")]
    Backend {
        /// The adapter primitive that failed.
        operation: &'static str,
        /// The libgit2 error.
        #[source]
        source: git2::Error,
    },
}

impl VcsError {
    /// Build a mapper for `map_err` that tags a libgit2 error with its primitive.
    pub(crate) fn backend(operation: &'static str) -> impl FnOnce(git2::Error) -> Self {
        move |source| Self::Backend { operation, source }
    }
}
