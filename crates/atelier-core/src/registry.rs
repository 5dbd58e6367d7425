//! The process-wide project registry.
//!
//! The registry is a single JSON array of [`RegistryEntry`] values. It is the
//! source of truth for "does project X exist" and for which port ranges are
//! taken. Every read-modify-write cycle runs under one in-process mutex so
//! two concurrent creations can never allocate the same range.
//!
//! ## File format
//!
//! ```json
//! [
//!   {"id": "3f0c...", "name": "demo", "port_range": [50000, 50099]}
//! ]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::PortSettings;
use crate::errors::AtelierError;
use crate::project::ProjectId;

// ============================================================================
// PortRange
// ============================================================================

/// A contiguous block of ports reserved for one project.
///
/// Serialized as a two-element array `[first, last]`; both ends are
/// reserved, so `[50000, 50099]` covers 100 ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange(pub u32, pub u32);

impl PortRange {
    /// A range of `width` ports starting at `first`.
    ///
    /// Returns `None` for a zero width or when the range would overflow.
    pub fn with_width(first: u32, width: u32) -> Option<Self> {
        let last = first.checked_add(width.checked_sub(1)?)?;
        Some(Self(first, last))
    }

    /// First reserved port.
    pub fn first(&self) -> u32 {
        self.0
    }

    /// Last reserved port.
    pub fn last(&self) -> u32 {
        self.1
    }

    /// Whether two ranges share at least one port.
    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.0 <= other.1 && other.0 <= self.1
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

/// Find the first free range, scanning upward from the default range.
///
/// Candidates are `settings.start + k * settings.width` for `k = 0, 1, ...`;
/// the first candidate overlapping none of `occupied` wins. Deterministic, and
/// it terminates because `occupied` is finite. Returns `None` only when the
/// scan runs off the end of the `u32` port space.
pub fn allocate_port_range(occupied: &[PortRange], settings: &PortSettings) -> Option<PortRange> {
    let mut candidate = PortRange::with_width(settings.start, settings.width)?;
    while occupied.iter().any(|taken| taken.overlaps(&candidate)) {
        let next_first = candidate.first().checked_add(settings.width)?;
        candidate = PortRange::with_width(next_first, settings.width)?;
    }
    Some(candidate)
}

// ============================================================================
// RegistryEntry
// ============================================================================

/// One project's row in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Project ID.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Reserved ports.
    pub port_range: PortRange,
}

// ============================================================================
// ProjectRegistry
// ============================================================================

/// Handle on the registry file.
///
/// All access goes through this type; holding it behind the engine is what
/// makes the registry lock process-wide.
#[derive(Debug)]
pub struct ProjectRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProjectRegistry {
    /// Open the registry at `path`, creating an empty one if missing.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::Registry`] if the file or its parent directory
    /// cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AtelierError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| registry_error(&path, "create directory", e))?;
        }
        if !path.exists() {
            write_entries(&path, &[])?;
            tracing::debug!("Created empty project registry at {}", path.display());
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Path of the registry file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, in registration order.
    pub fn entries(&self) -> Result<Vec<RegistryEntry>, AtelierError> {
        let _guard = self.lock.lock();
        read_entries(&self.path)
    }

    /// Look up one entry.
    pub fn find(&self, id: &ProjectId) -> Result<Option<RegistryEntry>, AtelierError> {
        Ok(self.entries()?.into_iter().find(|entry| entry.id == *id))
    }

    /// Registry membership check.
    pub fn contains(&self, id: &ProjectId) -> Result<bool, AtelierError> {
        Ok(self.find(id)?.is_some())
    }

    /// Append a new entry with a freshly allocated port range.
    ///
    /// Allocation and append happen in one critical section.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::Registry`] if the ID is already registered,
    /// the port space is exhausted, or the file cannot be rewritten.
    pub fn register(
        &self,
        id: &ProjectId,
        name: &str,
        ports: &PortSettings,
    ) -> Result<RegistryEntry, AtelierError> {
        let _guard = self.lock.lock();
        let mut entries = read_entries(&self.path)?;

        if entries.iter().any(|entry| entry.id == *id) {
            return Err(AtelierError::Registry {
                path: self.path.clone(),
                message: format!("project `{}` is already registered", id),
            });
        }

        let occupied: Vec<PortRange> = entries.iter().map(|entry| entry.port_range).collect();
        let port_range =
            allocate_port_range(&occupied, ports).ok_or_else(|| AtelierError::Registry {
                path: self.path.clone(),
                message: format!(
                    "no free port range of width {} at or above {}",
                    ports.width, ports.start
                ),
            })?;
        tracing::debug!(
            project = %id,
            %port_range,
            occupied = occupied.len(),
            "Allocated port range"
        );

        let entry = RegistryEntry {
            id: id.clone(),
            name: name.to_string(),
            port_range,
        };
        entries.push(entry.clone());
        write_entries(&self.path, &entries)?;
        Ok(entry)
    }

    /// Change an entry's name. Returns `false` if the ID is not registered.
    pub fn rename(&self, id: &ProjectId, name: &str) -> Result<bool, AtelierError> {
        let _guard = self.lock.lock();
        let mut entries = read_entries(&self.path)?;
        let Some(entry) = entries.iter_mut().find(|entry| entry.id == *id) else {
            return Ok(false);
        };
        entry.name = name.to_string();
        write_entries(&self.path, &entries)?;
        Ok(true)
    }

    /// Drop an entry. Returns `false` if the ID was not registered.
    pub fn remove(&self, id: &ProjectId) -> Result<bool, AtelierError> {
        let _guard = self.lock.lock();
        let mut entries = read_entries(&self.path)?;
        let before = entries.len();
        entries.retain(|entry| entry.id != *id);
        if entries.len() == before {
            return Ok(false);
        }
        write_entries(&self.path, &entries)?;
        Ok(true)
    }
}

fn registry_error(path: &Path, action: &str, err: impl std::fmt::Display) -> AtelierError {
    AtelierError::Registry {
        path: path.to_path_buf(),
        message: format!("failed to {}: {}", action, err),
    }
}

fn read_entries(path: &Path) -> Result<Vec<RegistryEntry>, AtelierError> {
    let content = fs::read_to_string(path).map_err(|e| registry_error(path, "read", e))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|e| registry_error(path, "parse", e))
}

/// Rewrite the registry through a sibling temp file and a rename.
fn write_entries(path: &Path, entries: &[RegistryEntry]) -> Result<(), AtelierError> {
    let data = serde_json::to_string(entries).map_err(|e| registry_error(path, "serialize", e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).map_err(|e| registry_error(path, "write", e))?;
    fs::rename(&tmp, path).map_err(|e| registry_error(path, "replace", e))
}

// ============================================================================
// Tests
// ============================================================================
