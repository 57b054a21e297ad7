//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{validate_log_level, validate_namespace, ContractConfig, ProjectConfig};
use crate::ConfigResult;
use std::env;
use std::path::{Path, PathBuf};

/// Project config file name
pub const PROJECT_CONFIG_FILE: &str = "isthmus.toml";

/// Log filter used when no source sets one
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Overrides `[library] path`
pub const ENV_LIBRARY: &str = "ISTHMUS_LIBRARY";
/// Overrides `[library] namespace`
pub const ENV_NAMESPACE: &str = "ISTHMUS_NAMESPACE";
/// Overrides `[logging] level`
pub const ENV_LOG: &str = "ISTHMUS_LOG";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.isthmus/config.toml) - lowest priority
/// 2. Project config (./isthmus.toml) - overrides global
/// 3. Environment variables (ISTHMUS_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Project root directory (where isthmus.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Read the global config from `path` instead of ~/.isthmus/config.toml
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find isthmus.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;

        // Global config is optional; a broken one must still be reported
        let global_config = self.load_global_config()?;

        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config()?;
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = config_path.parent().map(|p| p.to_path_buf());

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config); the default config when no
    /// isthmus.toml exists up to the filesystem root
    fn find_project_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.isthmus/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match GlobalConfig::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                // No home directory: nothing to load
                Err(_) => return Ok(GlobalConfig::default()),
            },
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides to project config
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Some(path) = env::var_os(ENV_LIBRARY) {
            config.library.get_or_insert_with(Default::default).path = Some(PathBuf::from(path));
        }

        if let Ok(namespace) = env::var(ENV_NAMESPACE) {
            validate_namespace(ENV_NAMESPACE, &namespace)?;
            config.library.get_or_insert_with(Default::default).namespace = Some(namespace);
        }

        if let Ok(level) = env::var(ENV_LOG) {
            validate_log_level(ENV_LOG, &level)?;
            config.logging.get_or_insert_with(Default::default).level = Some(level);
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has isthmus.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Get the library base name
    pub fn library_name(&self) -> Option<&str> {
        self.project.library_name()
    }

    /// Get the symbol namespace
    pub fn namespace(&self) -> Option<&str> {
        self.project.namespace()
    }

    /// Get the explicit library path, resolved against the project root
    pub fn library_path(&self) -> Option<PathBuf> {
        self.project.library_path().map(|path| self.resolve(path))
    }

    /// Library search directories: project paths (resolved against the
    /// project root) first, then global ones
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let project = self
            .project
            .library
            .iter()
            .flat_map(|l| l.search_paths.iter())
            .map(|path| self.resolve(path));
        project.chain(self.global.search_paths().iter().cloned()).collect()
    }

    /// Expected interface contract, if configured
    pub fn contract(&self) -> Option<&ContractConfig> {
        self.project.contract.as_ref()
    }

    /// Get the effective log filter (project > global > default)
    pub fn log_level(&self) -> &str {
        self.project
            .log_level()
            .or_else(|| self.global.default_log_level())
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.project_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_CONFIG_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(dir: &TempDir) -> ConfigLoader {
        ConfigLoader::with_global_config_path(dir.path().join("no-global.toml"))
    }

    #[test]
    #[serial]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_content = r#"
[library]
name = "torii"
namespace = "torii"
"#;
        create_config_file(temp_dir.path(), config_content);

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.library_name(), Some("torii"));
        assert!(config.is_project());
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[library]\nname = \"parent\"\n");

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(&sub_dir).unwrap();

        assert_eq!(config.library_name(), Some("parent"));
        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    #[serial]
    fn test_no_project_config() {
        let temp_dir = TempDir::new().unwrap();

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.library_name(), None);
        assert!(!config.is_project());
    }

    #[test]
    #[serial]
    fn test_env_override_namespace() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[library]\nnamespace = \"torii\"\n");

        env::set_var(ENV_NAMESPACE, "dojo");

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.namespace(), Some("dojo"));

        env::remove_var(ENV_NAMESPACE);
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_namespace() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var(ENV_NAMESPACE, "not-an-ident");

        let mut loader = isolated_loader(&temp_dir);
        let result = loader.load_from_directory(temp_dir.path());

        env::remove_var(ENV_NAMESPACE);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_log_level() {
        let config = Config {
            project: ProjectConfig::default(),
            global: GlobalConfig::default(),
            project_root: None,
        };

        assert_eq!(config.log_level(), DEFAULT_LOG_LEVEL);
    }

    #[test]
    #[serial]
    fn test_relative_paths_resolve_against_root() {
        let temp_dir = TempDir::new().unwrap();
        let config_content = r#"
[library]
path = "target/libtorii.so"
search_paths = ["lib"]
"#;
        let config_path = create_config_file(temp_dir.path(), config_content);

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_file(&config_path).unwrap();

        assert_eq!(config.library_path(), Some(temp_dir.path().join("target/libtorii.so")));
        assert_eq!(config.search_paths(), vec![temp_dir.path().join("lib")]);
    }
}
