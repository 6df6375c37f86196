//! Mule configuration
//!
//! User-level settings for the build driver:
//! - Global user configuration (~/.mule/config.toml)
//! - Environment overrides (MULE_*)
//! - Project root discovery (the nearest directory holding mule.toml)
//!
//! # Configuration Hierarchy
//!
//! Later sources override earlier ones:
//! 1. Global config (~/.mule/config.toml)
//! 2. Environment variables (MULE_*)
//! 3. CLI flags (applied by the caller)
//!
//! # Example
//!
//! ```no_run
//! use mule_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("building with {} jobs", config.effective_jobs());
//! ```

pub mod global;
pub mod loader;

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

pub use global::GlobalConfig;
pub use loader::{find_project_root, Config, ConfigLoader, ENV_CACHE_DIR, ENV_COMPILER, ENV_JOBS, ENV_PROFILE, ENV_REGISTRY, ENV_TARGET_DIR};
