//! Configuration types for Atelier.
//!
//! - [`GlobalConfig`]: user-level configuration stored in `~/.atelier/config.yaml`
//! - [`CommitDefaults`]: identity and message used when a caller supplies none
//! - [`PortSettings`]: default port range and allocation stride

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    ATELIER_HOME_DIR, DEFAULT_AUTHOR_EMAIL, DEFAULT_AUTHOR_NAME, DEFAULT_COMMIT_MESSAGE,
    DEFAULT_PORT_START, DEFAULT_PORT_WIDTH, GLOBAL_CONFIG_FILENAME, PROJECTS_DIR,
    REGISTRY_FILENAME,
};
use crate::errors::AtelierError;

// ============================================================================
// CommitDefaults
// ============================================================================

/// Fallback identity and message for commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitDefaults {
    /// Author name for system commits and empty caller-supplied names.
    pub author_name: String,
    /// Author email for system commits and empty caller-supplied emails.
    pub author_email: String,
    /// Message for commits created without one.
    pub message: String,
}

impl Default for CommitDefaults {
    fn default() -> Self {
        Self {
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_string(),
            message: DEFAULT_COMMIT_MESSAGE.to_string(),
        }
    }
}

// ============================================================================
// PortSettings
// ============================================================================

/// Port range allocation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    /// First port of the default range.
    pub start: u32,
    /// Ports per project; also the distance between candidate ranges.
    pub width: u32,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            start: DEFAULT_PORT_START,
            width: DEFAULT_PORT_WIDTH,
        }
    }
}

// ============================================================================
// GlobalConfig
// ============================================================================

/// Global (user-level) configuration for Atelier.
///
/// # Example YAML
///
/// ```yaml
/// projects_dir: /srv/atelier/projects
/// commit:
///   author_name: Atelier
///   author_email: auto.commit@atelier
///   message: Auto-committed changes to files
/// ports:
///   start: 50000
///   width: 100
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Directory holding one subdirectory per project.
    /// Default: `~/.atelier/projects`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_dir: Option<PathBuf>,

    /// Registry file. Default: `<projects_dir>/project_db.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<PathBuf>,

    /// Commit fallbacks.
    #[serde(default)]
    pub commit: CommitDefaults,

    /// Port allocation.
    #[serde(default)]
    pub ports: PortSettings,
}

impl GlobalConfig {
    /// Load the global configuration from the default location (`~/.atelier/config.yaml`).
    ///
    /// If the file does not exist, returns a default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::InvalidConfig`] if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Self, AtelierError> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Ok(Self::default())
            }
        }
    }

    /// Load the global configuration from a specific path.
    ///
    /// If the file does not exist, returns a default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::InvalidConfig`] if the file exists but cannot be parsed.
    /// Returns [`AtelierError::InvalidConfiguration`] if validation fails.
    pub fn from_path(path: &Path) -> Result<Self, AtelierError> {
        if !path.exists() {
            tracing::debug!(
                "Global config not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            AtelierError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            AtelierError::InvalidConfig(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        let warnings = config.validate()?;
        for warning in warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok(config)
    }

    /// Get the default Atelier home directory (`~/.atelier`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(ATELIER_HOME_DIR))
    }

    /// Get the default global config file path (`~/.atelier/config.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join(GLOBAL_CONFIG_FILENAME))
    }

    /// Configuration rooted at an explicit projects directory.
    pub fn with_projects_dir(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: Some(projects_dir.into()),
            ..Self::default()
        }
    }

    /// The effective projects directory.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::InvalidConfiguration`] when neither the config
    /// nor the home directory provide one.
    pub fn resolved_projects_dir(&self) -> Result<PathBuf, AtelierError> {
        if let Some(dir) = &self.projects_dir {
            return Ok(dir.clone());
        }
        Self::default_dir()
            .map(|home| home.join(PROJECTS_DIR))
            .ok_or_else(|| AtelierError::InvalidConfiguration {
                message: "cannot determine the projects directory".to_string(),
                hint: "Set `projects_dir` in config.yaml or pass --root".to_string(),
            })
    }

    /// The effective registry path.
    pub fn resolved_registry_path(&self) -> Result<PathBuf, AtelierError> {
        match &self.registry_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.resolved_projects_dir()?.join(REGISTRY_FILENAME)),
        }
    }

    /// Validate the configuration.
    ///
    /// Returns a list of warnings for suspicious but usable values.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::InvalidConfiguration`] for values the engine
    /// cannot work with.
    pub fn validate(&self) -> Result<Vec<String>, AtelierError> {
        let mut warnings = Vec::new();

        if self.ports.width == 0 {
            return Err(AtelierError::InvalidConfiguration {
                message: "ports.width must be greater than 0".to_string(),
                hint: "Use the default of 100 or any positive width".to_string(),
            });
        }
        if self.ports.start.checked_add(self.ports.width).is_none() {
            return Err(AtelierError::InvalidConfiguration {
                message: format!(
                    "ports.start ({}) + ports.width ({}) overflows",
                    self.ports.start, self.ports.width
                ),
                hint: "Lower ports.start".to_string(),
            });
        }
        if self.ports.start.saturating_add(self.ports.width) > u32::from(u16::MAX) + 1 {
            warnings.push(format!(
                "default port range {}..{} extends past 65535",
                self.ports.start,
                self.ports.start.saturating_add(self.ports.width)
            ));
        }
        if self.commit.author_name.trim().is_empty() || self.commit.author_email.trim().is_empty()
        {
            warnings.push(
                "commit.author_name/author_email is empty; the built-in identity is used"
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_global_config_default() {
        let config = GlobalConfig::default();
        assert_eq!(config.commit.author_name, "Atelier");
        assert_eq!(config.commit.author_email, "auto.commit@atelier");
        assert_eq!(config.ports.start, 50_000);
        assert_eq!(config.ports.width, 100);
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = GlobalConfig::from_path(&temp.path().join("absent.yaml")).unwrap();
        assert_eq!(config, GlobalConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(
            &path,
            "projects_dir: /srv/atelier\nports:\n  start: 40000\ncommit:\n  message: saved\n",
        )
        .unwrap();

        let config = GlobalConfig::from_path(&path).unwrap();
        assert_eq!(config.projects_dir, Some(PathBuf::from("/srv/atelier")));
        assert_eq!(config.ports.start, 40_000);
        assert_eq!(config.ports.width, 100);
        assert_eq!(config.commit.message, "saved");
        assert_eq!(config.commit.author_name, "Atelier");
        assert_eq!(
            config.resolved_registry_path().unwrap(),
            PathBuf::from("/srv/atelier/project_db.json")
        );
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "ports: [unclosed").unwrap();
        assert!(matches!(
            GlobalConfig::from_path(&path),
            Err(AtelierError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_width_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "ports:\n  width: 0\n").unwrap();
        assert!(matches!(
            GlobalConfig::from_path(&path),
            Err(AtelierError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_high_ports_warn() {
        let mut config = GlobalConfig::default();
        config.ports.start = 65_500;
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("65535"));
    }

    #[test]
    fn test_explicit_registry_path_wins() {
        let config = GlobalConfig {
            projects_dir: Some(PathBuf::from("/a")),
            registry_path: Some(PathBuf::from("/b/db.json")),
            ..GlobalConfig::default()
        };
        assert_eq!(
            config.resolved_registry_path().unwrap(),
            PathBuf::from("/b/db.json")
        );
    }
}
