//! Build profile management
//!
//! Provides the dev and release profiles with their optimization level,
//! debug settings and preprocessor defines.

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Optimization level for compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OptLevel {
    /// No optimization (fast compilation)
    #[default]
    O0,
    /// Basic optimization
    O1,
    /// Full optimization (default for release)
    O2,
    /// Aggressive optimization
    O3,
}

impl OptLevel {
    /// Compiler flag for this level
    pub fn flag(&self) -> &'static str {
        match self {
            Self::O0 => "-O0",
            Self::O1 => "-O1",
            Self::O2 => "-O2",
            Self::O3 => "-O3",
        }
    }
}

/// Build profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Development profile (default)
    #[default]
    Dev,
    /// Release profile (optimized)
    Release,
}

impl Profile {
    /// Get profile name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Release => "release",
        }
    }

    /// Get default configuration for this profile
    pub fn default_config(&self) -> ProfileConfig {
        match self {
            Self::Dev => ProfileConfig {
                name: "dev".to_string(),
                optimization_level: OptLevel::O0,
                debug_info: true,
                defines: Vec::new(),
            },
            Self::Release => ProfileConfig {
                name: "release".to_string(),
                optimization_level: OptLevel::O2,
                debug_info: false,
                defines: vec!["NDEBUG".to_string()],
            },
        }
    }
}

impl FromStr for Profile {
    type Err = BuildError;

    fn from_str(s: &str) -> BuildResult<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "debug" => Ok(Self::Dev),
            "release" => Ok(Self::Release),
            other => Err(BuildError::UnknownProfile(other.to_string())),
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Profile configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Profile name
    pub name: String,
    /// Optimization level
    #[serde(default)]
    pub optimization_level: OptLevel,
    /// Include debug information
    #[serde(default)]
    pub debug_info: bool,
    /// Preprocessor defines added to every compile
    #[serde(default)]
    pub defines: Vec<String>,
}

impl ProfileConfig {
    /// Create from profile with defaults
    pub fn from_profile(profile: Profile) -> Self {
        profile.default_config()
    }

    /// Compiler flags contributed by this profile, in a fixed order
    pub fn compile_flags(&self) -> Vec<String> {
        let mut flags = vec![self.optimization_level.flag().to_string()];
        if self.debug_info {
            flags.push("-g".to_string());
        }
        flags.extend(self.defines.iter().map(|d| format!("-D{}", d)));
        flags
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Profile::Dev.default_config()
    }
}
