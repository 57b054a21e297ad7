//! Project Configuration (isthmus.toml)
//!
//! Handles project-level configuration stored in `isthmus.toml` at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project configuration from isthmus.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Native library to load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<LibraryConfig>,

    /// Expected interface contract
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<ContractConfig>,

    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Native library configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    /// Library base name, without platform prefix/suffix (e.g. "torii")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Explicit path to the library file; skips the search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Symbol namespace, as in `ffi_{namespace}_rustbuffer_free`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Extra directories to search, relative to the project root
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

/// Interface contract the bindings were generated against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ContractConfig {
    /// Contract version (`ffi_{namespace}_uniffi_contract_version`)
    pub version: u32,

    /// Checksum symbol name -> expected value
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub checksums: BTreeMap<String, u16>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "isthmus_runtime=trace"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(library) = &self.library {
            if let Some(name) = &library.name {
                if name.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "library.name".to_string(),
                        reason: "name cannot be empty".to_string(),
                    });
                }
            }
            if let Some(namespace) = &library.namespace {
                validate_namespace("library.namespace", namespace)?;
            }
        }

        if let Some(contract) = &self.contract {
            for symbol in contract.checksums.keys() {
                if symbol.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "contract.checksums".to_string(),
                        reason: "checksum symbol cannot be empty".to_string(),
                    });
                }
            }
        }

        if let Some(level) = self.logging.as_ref().and_then(|l| l.level.as_deref()) {
            validate_log_level("logging.level", level)?;
        }

        Ok(())
    }

    /// Get the library base name, if present
    pub fn library_name(&self) -> Option<&str> {
        self.library.as_ref().and_then(|l| l.name.as_deref())
    }

    /// Get the explicit library path, if present
    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_ref().and_then(|l| l.path.as_deref())
    }

    /// Get the symbol namespace, if present
    pub fn namespace(&self) -> Option<&str> {
        self.library.as_ref().and_then(|l| l.namespace.as_deref())
    }

    /// Get the log filter, if present
    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }

    /// Merge another project config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &ProjectConfig) {
        if other.library.is_some() {
            self.library = other.library.clone();
        }
        if other.contract.is_some() {
            self.contract = other.contract.clone();
        }
        if other.logging.is_some() {
            self.logging = other.logging.clone();
        }
    }
}

/// Namespaces are spliced into symbol names, so they must be identifiers.
pub(crate) fn validate_namespace(field: &str, namespace: &str) -> ConfigResult<()> {
    let mut chars = namespace.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}' is not a valid identifier", namespace),
        });
    }
    Ok(())
}

pub(crate) fn validate_log_level(field: &str, level: &str) -> ConfigResult<()> {
    if level.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "level cannot be empty".to_string(),
        });
    }
    Ok(())
}
