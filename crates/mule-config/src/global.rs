//! Global Configuration (~/.mule/config.toml)
//!
//! Handles user-level configuration stored in `~/.mule/config.toml`.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Profiles the build driver knows about
pub const KNOWN_PROFILES: [&str; 2] = ["dev", "release"];

/// Global user configuration from ~/.mule/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct GlobalConfig {
    /// Maximum number of tasks run at once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Compiler program, e.g. `clang++` or a full path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,

    /// Default build profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Directory holding the artifact cache index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Directory for objects and linked outputs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_dir: Option<PathBuf>,

    /// Local package registry root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<PathBuf>,
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
        if self.jobs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "jobs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if let Some(profile) = &self.profile {
            validate_profile("profile", profile)?;
        }

        if let Some(compiler) = &self.compiler {
            if compiler.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "compiler".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the global config file path (~/.mule/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        Ok(global_config_dir()?.join("config.toml"))
    }

    /// Merge another global config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        if other.jobs.is_some() {
            self.jobs = other.jobs;
        }
        if other.compiler.is_some() {
            self.compiler = other.compiler.clone();
        }
        if other.profile.is_some() {
            self.profile = other.profile.clone();
        }
        if other.cache_dir.is_some() {
            self.cache_dir = other.cache_dir.clone();
        }
        if other.target_dir.is_some() {
            self.target_dir = other.target_dir.clone();
        }
        if other.registry.is_some() {
            self.registry = other.registry.clone();
        }
    }
}

/// Get the global configuration directory (~/.mule)
pub fn global_config_dir() -> ConfigResult<PathBuf> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    Ok(home.join(".mule"))
}

pub(crate) fn validate_profile(field: &str, value: &str) -> ConfigResult<()> {
    if !KNOWN_PROFILES.contains(&value) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be 'dev' or 'release', got '{}'", value),
        });
    }
    Ok(())
}
