//! Global Configuration (~/.isthmus/config.toml)
//!
//! Handles user-level configuration stored in `~/.isthmus/config.toml`.

use crate::project::{validate_log_level, LoggingConfig};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.isthmus/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Library search settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<GlobalLibraryConfig>,

    /// Default logging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Library search settings shared by all projects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalLibraryConfig {
    /// Directories searched after the project's own search paths
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(level) = self.default_log_level() {
            validate_log_level("logging.level", level)?;
        }
        Ok(())
    }

    /// Get the global config file path (~/.isthmus/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".isthmus").join("config.toml"))
    }

    /// Get the default log filter
    pub fn default_log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }

    /// Extra library search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        self.library.as_ref().map(|l| l.search_paths.as_slice()).unwrap_or(&[])
    }

    /// Merge another global config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        if other.library.is_some() {
            self.library = other.library.clone();
        }
        if other.logging.is_some() {
            self.logging = other.logging.clone();
        }
    }
}
