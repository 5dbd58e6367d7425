//! Static attribute schemas for the two resource types.
//!
//! Caller-supplied attribute maps are checked against one ordered schema per
//! resource before any I/O happens. Checks run in a fixed order: unknown
//! names (forbidden), then engine-owned names (conflict), then missing
//! required names and wrong types (validation).

use serde_json::{Map, Value};

use crate::errors::AtelierError;
use crate::history::COMMITS_TYPE;
use crate::project::PROJECTS_TYPE;
use crate::state_files::StateDocument;

/// Attribute map as supplied by a caller.
pub type Attributes = Map<String, Value>;

/// How an attribute may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeAccess {
    /// Writable, and must be present when the resource is created.
    Required,
    /// Writable, optional.
    Mutable,
    /// Owned by the engine; never writable.
    Computed,
}

impl AttributeAccess {
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::Computed)
    }
}

/// The attribute schema of one resource type.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSchema {
    resource: &'static str,
    attributes: &'static [(&'static str, AttributeAccess)],
}

/// Project attributes.
pub const PROJECT_SCHEMA: ResourceSchema = ResourceSchema {
    resource: PROJECTS_TYPE,
    attributes: &[
        ("name", AttributeAccess::Required),
        ("path", AttributeAccess::Computed),
        ("canvas", AttributeAccess::Mutable),
        ("workflow", AttributeAccess::Mutable),
        ("notebooks_dir", AttributeAccess::Computed),
        ("current_commit", AttributeAccess::Mutable),
        ("latest_commit", AttributeAccess::Computed),
        ("has_uncommitted_changes", AttributeAccess::Computed),
        ("port_range", AttributeAccess::Computed),
    ],
};

/// Commit attributes.
pub const COMMIT_SCHEMA: ResourceSchema = ResourceSchema {
    resource: COMMITS_TYPE,
    attributes: &[
        ("project_id", AttributeAccess::Computed),
        ("branch", AttributeAccess::Computed),
        ("parent_commit_id", AttributeAccess::Computed),
        ("parents", AttributeAccess::Computed),
        ("author_name", AttributeAccess::Mutable),
        ("author_email", AttributeAccess::Mutable),
        ("message", AttributeAccess::Required),
        ("timestamp", AttributeAccess::Computed),
        ("timezone_offset", AttributeAccess::Computed),
    ],
};

impl ResourceSchema {
    /// Resource type name.
    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// Attribute names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes.iter().map(|(name, _)| *name)
    }

    /// Access of `name`, or `None` if the schema does not know it.
    pub fn access(&self, name: &str) -> Option<AttributeAccess> {
        self.attributes
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, access)| *access)
    }

    /// Check a write against the schema.
    ///
    /// With `creating` set, every [`AttributeAccess::Required`] attribute
    /// must be present.
    pub fn check(&self, attrs: &Attributes, creating: bool) -> Result<(), AtelierError> {
        for name in attrs.keys() {
            if self.access(name).is_none() {
                return Err(AtelierError::UnrecognizedAttribute {
                    resource: self.resource,
                    attribute: name.clone(),
                });
            }
        }

        for name in attrs.keys() {
            if self.access(name) == Some(AttributeAccess::Computed) {
                return Err(AtelierError::ReadOnlyAttribute {
                    resource: self.resource,
                    attribute: name.clone(),
                });
            }
        }

        if creating {
            for (name, access) in self.attributes {
                if *access == AttributeAccess::Required && !attrs.contains_key(*name) {
                    return Err(AtelierError::MissingAttribute {
                        resource: self.resource,
                        attribute: name,
                    });
                }
            }
        }

        Ok(())
    }

    fn string(&self, attrs: &Attributes, name: &str) -> Result<Option<String>, AtelierError> {
        match attrs.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(AtelierError::InvalidAttribute {
                resource: self.resource,
                attribute: name.to_string(),
                expected: "a string",
            }),
        }
    }
}

// ============================================================================
// ProjectPatch
// ============================================================================

/// A validated set of project attribute changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub canvas: Option<StateDocument>,
    pub workflow: Option<StateDocument>,
    /// Ref to check out.
    pub current_commit: Option<String>,
}

impl ProjectPatch {
    /// Validate an attribute map for a project update.
    ///
    /// # Errors
    ///
    /// Forbidden, conflict or validation errors as described in the module
    /// docs. Nothing is written.
    pub fn from_attributes(attrs: &Attributes) -> Result<Self, AtelierError> {
        PROJECT_SCHEMA.check(attrs, false)?;
        Ok(Self {
            name: PROJECT_SCHEMA.string(attrs, "name")?,
            canvas: attrs.get("canvas").cloned(),
            workflow: attrs.get("workflow").cloned(),
            current_commit: PROJECT_SCHEMA.string(attrs, "current_commit")?,
        })
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.canvas.is_none()
            && self.workflow.is_none()
            && self.current_commit.is_none()
    }
}

/// Validate the attributes of a project creation and return its name.
pub fn project_name_from_attributes(attrs: &Attributes) -> Result<String, AtelierError> {
    PROJECT_SCHEMA.check(attrs, true)?;
    for name in attrs.keys() {
        if name != "name" {
            return Err(AtelierError::UnrecognizedAttribute {
                resource: PROJECTS_TYPE,
                attribute: name.clone(),
            });
        }
    }
    Ok(PROJECT_SCHEMA.string(attrs, "name")?.unwrap_or_default())
}

// ============================================================================
// NewCommit
// ============================================================================

/// A validated commit request.
///
/// Empty fields are allowed here; the engine substitutes the configured
/// defaults when it commits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCommit {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub message: String,
}

impl NewCommit {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = Some(name.into());
        self.author_email = Some(email.into());
        self
    }

    /// Validate an attribute map for commit creation. `message` must be
    /// present as a key.
    pub fn from_attributes(attrs: &Attributes) -> Result<Self, AtelierError> {
        COMMIT_SCHEMA.check(attrs, true)?;
        let author_name = COMMIT_SCHEMA.string(attrs, "author_name")?;
        let author_email = COMMIT_SCHEMA.string(attrs, "author_email")?;
        if let Some(name) = &author_name {
            check_identity_field("author_name", name)?;
        }
        if let Some(email) = &author_email {
            check_identity_field("author_email", email)?;
        }
        Ok(Self {
            author_name,
            author_email,
            message: COMMIT_SCHEMA.string(attrs, "message")?.unwrap_or_default(),
        })
    }
}

/// Reject an author name or email git cannot record in a signature.
///
/// Angle brackets delimit the email in the signature line and line breaks
/// end the header, so neither may appear in either field.
pub fn check_identity_field(attribute: &str, value: &str) -> Result<(), AtelierError> {
    if value.contains(['<', '>', '\n', '\r', '\0']) {
        return Err(AtelierError::InvalidAttribute {
            resource: COMMITS_TYPE,
            attribute: attribute.to_string(),
            expected: "text without angle brackets or line breaks",
        });
    }
    Ok(())
}
