//! Reading and writing the project state documents.
//!
//! Each project carries two JSON documents under `.state/`: the canvas and
//! the workflow. Writes go through a scratch file beside the project
//! directory followed by a rename, so a reader never observes a half-written
//! document and a crash mid-write leaves nothing inside the working tree.

use std::fs;
use std::path::Path;

use crate::constants::{CANVAS_FILENAME, WORKFLOW_FILENAME};
use crate::errors::AtelierError;
use crate::project::ProjectLayout;

/// An arbitrary structured state document.
pub type StateDocument = serde_json::Value;

/// Which of the two state documents to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFileKind {
    Canvas,
    Workflow,
}

impl StateFileKind {
    fn path(self, layout: &ProjectLayout) -> std::path::PathBuf {
        match self {
            Self::Canvas => layout.canvas_path(),
            Self::Workflow => layout.workflow_path(),
        }
    }
}

impl StateFileKind {
    fn file_name(self) -> &'static str {
        match self {
            Self::Canvas => CANVAS_FILENAME,
            Self::Workflow => WORKFLOW_FILENAME,
        }
    }
}

impl std::fmt::Display for StateFileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Canvas => write!(f, "canvas"),
            Self::Workflow => write!(f, "workflow"),
        }
    }
}

/// State document access for one project.
#[derive(Debug, Clone, Copy)]
pub struct StateFiles<'a> {
    layout: &'a ProjectLayout,
}

impl<'a> StateFiles<'a> {
    /// Address the documents of the project at `layout`.
    pub fn new(layout: &'a ProjectLayout) -> Self {
        Self { layout }
    }

    /// Read one document.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::StateFile`] if the file is missing or is not
    /// valid JSON.
    pub fn read(&self, kind: StateFileKind) -> Result<StateDocument, AtelierError> {
        read_document(&kind.path(self.layout))
    }

    /// Overwrite one document.
    pub fn write(&self, kind: StateFileKind, doc: &StateDocument) -> Result<(), AtelierError> {
        let path = kind.path(self.layout);
        let scratch = self.layout.scratch_path(kind.file_name());
        write_document(&path, &scratch, doc)
    }

    /// Read both documents as `(canvas, workflow)`.
    pub fn read_all(&self) -> Result<(StateDocument, StateDocument), AtelierError> {
        Ok((
            self.read(StateFileKind::Canvas)?,
            self.read(StateFileKind::Workflow)?,
        ))
    }

    /// Write empty object documents for a brand-new project.
    pub fn write_empty(&self) -> Result<(), AtelierError> {
        let empty = StateDocument::Object(serde_json::Map::new());
        self.write(StateFileKind::Canvas, &empty)?;
        self.write(StateFileKind::Workflow, &empty)
    }
}

fn state_error(path: &Path, action: &str, err: impl std::fmt::Display) -> AtelierError {
    AtelierError::StateFile {
        path: path.to_path_buf(),
        message: format!("failed to {}: {}", action, err),
    }
}

fn read_document(path: &Path) -> Result<StateDocument, AtelierError> {
    let data = fs::read_to_string(path).map_err(|e| state_error(path, "read", e))?;
    serde_json::from_str(&data).map_err(|e| state_error(path, "parse", e))
}

fn write_document(path: &Path, scratch: &Path, doc: &StateDocument) -> Result<(), AtelierError> {
    let data = serde_json::to_string_pretty(doc).map_err(|e| state_error(path, "serialize", e))?;
    fs::write(scratch, data).map_err(|e| state_error(path, "write", e))?;
    fs::rename(scratch, path).map_err(|e| state_error(path, "replace", e))
}
