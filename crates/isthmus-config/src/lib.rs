//! Isthmus Configuration System
//!
//! Provides configuration for isthmus bridges:
//! - Project configuration (isthmus.toml): which native library to load,
//!   its symbol namespace, and the expected interface contract
//! - Global user configuration (~/.isthmus/config.toml)
//! - Configuration precedence and merging
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.isthmus/config.toml)
//! 2. Project config (./isthmus.toml, searched upwards)
//! 3. Environment variables (ISTHMUS_LIBRARY, ISTHMUS_NAMESPACE, ISTHMUS_LOG)
//! 4. CLI flags
//!
//! # Example
//!
//! ```no_run
//! use isthmus_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("log level: {}", config.log_level());
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use project::{ContractConfig, LibraryConfig, LoggingConfig, ProjectConfig};
