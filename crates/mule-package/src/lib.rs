//! Mule package management
//!
//! Manifest model for mule.toml files, version ranges, the candidate
//! universe, the backtracking dependency resolver and lockfile generation.

pub mod build_order;
pub mod lockfile;
pub mod manifest;
pub mod resolver;
pub mod universe;
pub mod validator;
pub mod version;

pub use build_order::{BuildOrderComputer, BuildOrderError};
pub use lockfile::{LockedPackage, LockedSource, Lockfile, LOCKFILE_NAME};
pub use manifest::{
    load_package, BuildSettings, Dependency, DependencyDecl, DetailedDependency, Package,
    PackageManifest, TargetDecl, TargetKind, TargetRef,
};
pub use resolver::{
    resolve, Conflict, ConflictingConstraint, ResolvedPackage, ResolvedSet, Resolver,
    ResolverConfig, ResolverError, ResolverResult,
};
pub use universe::{DirectoryRegistry, MemoryUniverse, PackageSource, PathOverlay, MANIFEST_FILE};
pub use validator::{ValidationError, Validator};
pub use version::{RangeError, VersionRange};

/// Manifest loading errors
///
/// Every variant is fatal: a malformed manifest aborts before resolution.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize manifest: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Semver error: {0}")]
    SemverError(#[from] semver::Error),

    #[error(transparent)]
    RangeError(#[from] RangeError),

    #[error("Invalid field value: {field} - {reason}")]
    InvalidField { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, PackageError>;
