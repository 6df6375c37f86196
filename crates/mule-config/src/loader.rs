//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::{global_config_dir, validate_profile, GlobalConfig};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

pub const ENV_JOBS: &str = "MULE_JOBS";
pub const ENV_COMPILER: &str = "MULE_COMPILER";
pub const ENV_PROFILE: &str = "MULE_PROFILE";
pub const ENV_CACHE_DIR: &str = "MULE_CACHE_DIR";
pub const ENV_TARGET_DIR: &str = "MULE_TARGET_DIR";
pub const ENV_REGISTRY: &str = "MULE_REGISTRY";

/// File whose presence marks a project root
const PROJECT_MANIFEST: &str = "mule.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.mule/config.toml) - lowest priority
/// 2. Environment variables (MULE_*) - overrides global
/// 3. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Merged settings
    pub settings: GlobalConfig,

    /// Project root directory (where mule.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Read the global configuration from `path` instead of ~/.mule/config.toml
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find mule.toml, then loads the global
    /// config if it exists and applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let project_root = find_project_root(start_dir);
        let mut settings = self.load_global_config()?;
        apply_env_overrides(&mut settings)?;

        tracing::debug!(
            "Loaded configuration (project root: {})",
            project_root
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        Ok(Config {
            settings,
            project_root,
        })
    }

    /// Load global configuration, defaulting when the file does not exist
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match GlobalConfig::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                Err(ConfigError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(e) => return Err(e),
            },
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest ancestor of `start_dir` (inclusive) containing mule.toml
pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .find(|dir| dir.join(PROJECT_MANIFEST).is_file())
        .map(Path::to_path_buf)
}

/// Apply MULE_* environment variables on top of `settings`
fn apply_env_overrides(settings: &mut GlobalConfig) -> ConfigResult<()> {
    if let Ok(jobs) = env::var(ENV_JOBS) {
        let jobs = jobs.trim().parse::<NonZeroUsize>().map_err(|_| ConfigError::InvalidValue {
            field: ENV_JOBS.to_string(),
            reason: format!("expected a positive integer, got '{}'", jobs),
        })?;
        settings.jobs = Some(jobs.get());
    }

    if let Ok(compiler) = env::var(ENV_COMPILER) {
        if !compiler.trim().is_empty() {
            settings.compiler = Some(compiler);
        }
    }

    if let Ok(profile) = env::var(ENV_PROFILE) {
        validate_profile(ENV_PROFILE, &profile)?;
        settings.profile = Some(profile);
    }

    if let Some(dir) = env::var_os(ENV_CACHE_DIR) {
        settings.cache_dir = Some(PathBuf::from(dir));
    }
    if let Some(dir) = env::var_os(ENV_TARGET_DIR) {
        settings.target_dir = Some(PathBuf::from(dir));
    }
    if let Some(dir) = env::var_os(ENV_REGISTRY) {
        settings.registry = Some(PathBuf::from(dir));
    }

    Ok(())
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has mule.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Configured job count, else the machine's available parallelism
    pub fn effective_jobs(&self) -> NonZeroUsize {
        self.settings
            .jobs
            .and_then(NonZeroUsize::new)
            .or_else(|| std::thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN)
    }

    /// Profile name, `dev` unless configured
    pub fn profile(&self) -> &str {
        self.settings.profile.as_deref().unwrap_or("dev")
    }

    /// Explicit compiler program, if any; `None` means detect one
    pub fn compiler(&self) -> Option<&str> {
        self.settings.compiler.as_deref()
    }

    /// Output directory; defaults to `<project>/target`
    pub fn target_dir(&self) -> PathBuf {
        match &self.settings.target_dir {
            Some(dir) => self.anchor(dir),
            None => self.anchor(Path::new("target")),
        }
    }

    /// Cache directory; defaults to `<target>/cache`
    pub fn cache_dir(&self) -> PathBuf {
        match &self.settings.cache_dir {
            Some(dir) => self.anchor(dir),
            None => self.target_dir().join("cache"),
        }
    }

    /// Local registry root; defaults to ~/.mule/registry
    pub fn registry(&self) -> Option<PathBuf> {
        match &self.settings.registry {
            Some(dir) => Some(self.anchor(dir)),
            None => global_config_dir().ok().map(|dir| dir.join("registry")),
        }
    }

    /// Relative paths are taken from the project root
    fn anchor(&self, path: &Path) -> PathBuf {
        match &self.project_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn project(dir: &Path) {
        fs::write(
            dir.join(PROJECT_MANIFEST),
            "[package]\nname = \"app\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
    }

    fn loader(temp: &TempDir) -> ConfigLoader {
        ConfigLoader::with_global_config_path(temp.path().join("config.toml"))
    }

    #[test]
    #[serial]
    fn test_find_project_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        project(temp_dir.path());
        let sub_dir = temp_dir.path().join("src").join("nested");
        fs::create_dir_all(&sub_dir).unwrap();

        let config = loader(&temp_dir).load_from_directory(&sub_dir).unwrap();
        assert_eq!(config.project_root(), Some(temp_dir.path()));
        assert_eq!(config.target_dir(), temp_dir.path().join("target"));
        assert_eq!(config.cache_dir(), temp_dir.path().join("target").join("cache"));
    }

    #[test]
    #[serial]
    fn test_no_project() {
        let temp_dir = TempDir::new().unwrap();
        let config = loader(&temp_dir).load_from_directory(temp_dir.path()).unwrap();
        assert!(!config.is_project());
        assert_eq!(config.profile(), "dev");
    }

    #[test]
    #[serial]
    fn test_env_override_jobs() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("config.toml"), "jobs = 2\n").unwrap();

        env::set_var(ENV_JOBS, "6");
        let config = loader(&temp_dir).load_from_directory(temp_dir.path());
        env::remove_var(ENV_JOBS);

        assert_eq!(config.unwrap().effective_jobs().get(), 6);
    }

    #[test]
    #[serial]
    fn test_env_invalid_jobs() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var(ENV_JOBS, "many");
        let result = loader(&temp_dir).load_from_directory(temp_dir.path());
        env::remove_var(ENV_JOBS);

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_effective_jobs_falls_back() {
        let config = Config::default();
        assert!(config.effective_jobs().get() >= 1);
    }

    #[test]
    fn test_absolute_paths_kept() {
        let config = Config {
            settings: GlobalConfig {
                target_dir: Some(PathBuf::from("/var/build")),
                ..Default::default()
            },
            project_root: Some(PathBuf::from("/work/app")),
        };
        assert_eq!(config.target_dir(), PathBuf::from("/var/build"));
        assert_eq!(config.cache_dir(), PathBuf::from("/var/build/cache"));
    }
}
