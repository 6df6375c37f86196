//! Package manifest parsing and types (mule.toml)

use crate::version::VersionRange;
use crate::{PackageError, Result};
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default C++ standard when a manifest does not name one
pub const DEFAULT_STANDARD: &str = "17";

/// Package manifest (mule.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageManifest {
    pub package: PackageMetadata,
    #[serde(default)]
    pub dependencies: BTreeMap<String, Dependency>,
    #[serde(default)]
    pub build: BuildSettings,
    #[serde(default, rename = "target", skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetDecl>,
}

impl PackageManifest {
    /// Parse manifest from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load manifest from file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_str(&content)?)
    }

    /// Serialize to TOML string
    pub fn to_string(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validate the manifest and convert it into an immutable [`Package`]
    ///
    /// `root` is the directory the manifest was loaded from; relative
    /// include and library directories are resolved against it.
    pub fn into_package(self, root: Option<&Path>) -> Result<Package> {
        crate::validator::Validator::validate(&self).map_err(|errors| {
            PackageError::ValidationError(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        let mut package = Package::new(self.package.name, self.package.version)
            .with_standard(self.package.standard)
            .with_kind(self.package.kind)
            .with_build(self.build);

        for (name, dep) in self.dependencies {
            let range = VersionRange::parse(dep.version_constraint()).map_err(|e| {
                PackageError::InvalidField {
                    field: format!("dependencies.{}", name),
                    reason: e.to_string(),
                }
            })?;
            let path = dep.path().map(Path::to_path_buf);
            package.dependencies.push(DependencyDecl { name, range, path });
        }

        for target in self.targets {
            package = package.with_target(target);
        }

        if let Some(root) = root {
            package = package.with_root(root);
        }

        Ok(package)
    }
}

/// Load a manifest file and convert it into a [`Package`] rooted at its directory
pub fn load_package(manifest_path: &Path) -> Result<Package> {
    let manifest = PackageManifest::from_file(manifest_path)?;
    manifest.into_package(manifest_path.parent())
}

/// Package metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageMetadata {
    pub name: String,
    pub version: Version,
    #[serde(default = "default_standard")]
    pub standard: String,
    #[serde(default, rename = "type")]
    pub kind: TargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

fn default_standard() -> String {
    DEFAULT_STANDARD.to_string()
}

/// Dependency specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Dependency {
    /// Simple version constraint
    Simple(String),
    /// Detailed dependency
    Detailed(DetailedDependency),
}

impl Dependency {
    /// Version requirement, `*` when none is given
    pub fn version_constraint(&self) -> &str {
        match self {
            Dependency::Simple(v) => v,
            Dependency::Detailed(d) => d.version.as_deref().unwrap_or("*"),
        }
    }

    /// Local path of a path dependency
    pub fn path(&self) -> Option<&Path> {
        match self {
            Dependency::Simple(_) => None,
            Dependency::Detailed(d) => d.path.as_deref(),
        }
    }
}

/// Detailed dependency specification
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetailedDependency {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// Build settings from the `[build]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BuildSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_dirs: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defines: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lib_dirs: Vec<PathBuf>,
}

/// Kind of linked output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetKind {
    /// Executable program
    #[default]
    #[serde(rename = "bin")]
    Binary,
    /// Static archive
    #[serde(rename = "static-lib")]
    StaticLib,
    /// Shared library
    #[serde(rename = "shared-lib")]
    SharedLib,
}

impl TargetKind {
    /// Whether dependents link against this target
    pub fn is_library(&self) -> bool {
        matches!(self, Self::StaticLib | Self::SharedLib)
    }

    /// Manifest spelling of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "bin",
            Self::StaticLib => "static-lib",
            Self::SharedLib => "shared-lib",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `[[target]]` declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TargetDecl {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: TargetKind,
    /// Source path prefixes relative to the package root; empty means all sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PathBuf>,
    /// Other targets that must be linked before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<TargetRef>,
}

impl TargetDecl {
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            sources: Vec::new(),
            requires: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<PathBuf>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_requires(mut self, requires: Vec<TargetRef>) -> Self {
        self.requires = requires;
        self
    }

    /// Whether a source path (relative to the package root) feeds this target
    pub fn includes_source(&self, relative: &Path) -> bool {
        self.sources.is_empty() || self.sources.iter().any(|prefix| relative.starts_with(prefix))
    }
}

/// Reference to a target, written `pkg:target` or `target` for the same package
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetRef {
    pub package: Option<String>,
    pub target: String,
}

impl TargetRef {
    pub fn local(target: impl Into<String>) -> Self {
        Self {
            package: None,
            target: target.into(),
        }
    }

    pub fn external(package: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            package: Some(package.into()),
            target: target.into(),
        }
    }

    /// Package this reference points into, given the declaring package
    pub fn package_or<'a>(&'a self, current: &'a str) -> &'a str {
        self.package.as_deref().unwrap_or(current)
    }
}

impl FromStr for TargetRef {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PackageError::InvalidField {
            field: "requires".to_string(),
            reason: format!("malformed target reference '{}'", s),
        };

        match s.split_once(':') {
            Some((pkg, target)) => {
                if pkg.is_empty() || target.is_empty() || target.contains(':') {
                    return Err(invalid());
                }
                Ok(Self::external(pkg, target))
            }
            None if !s.is_empty() => Ok(Self::local(s)),
            None => Err(invalid()),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package {
            Some(pkg) => write!(f, "{}:{}", pkg, self.target),
            None => f.write_str(&self.target),
        }
    }
}

impl Serialize for TargetRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TargetRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A declared dependency constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyDecl {
    pub name: String,
    pub range: VersionRange,
    pub path: Option<PathBuf>,
}

/// A package version as seen by the resolver and the graph builder
///
/// Immutable once built; shared as `Arc<Package>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    name: String,
    version: Version,
    dependencies: Vec<DependencyDecl>,
    standard: String,
    kind: TargetKind,
    targets: Vec<TargetDecl>,
    build: BuildSettings,
    root: Option<PathBuf>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            dependencies: Vec::new(),
            standard: DEFAULT_STANDARD.to_string(),
            kind: TargetKind::default(),
            targets: Vec::new(),
            build: BuildSettings::default(),
            root: None,
        }
    }

    /// Declare a dependency; declaration order is resolution order
    pub fn with_dependency(mut self, name: impl Into<String>, range: VersionRange) -> Self {
        self.dependencies.push(DependencyDecl {
            name: name.into(),
            range,
            path: None,
        });
        self
    }

    pub fn with_standard(mut self, standard: impl Into<String>) -> Self {
        self.standard = standard.into();
        self
    }

    /// Kind of the default target used when no `[[target]]` is declared
    pub fn with_kind(mut self, kind: TargetKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_target(mut self, target: TargetDecl) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_build(mut self, build: BuildSettings) -> Self {
        self.build = build;
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn dependencies(&self) -> &[DependencyDecl] {
        &self.dependencies
    }

    pub fn standard(&self) -> &str {
        &self.standard
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn build(&self) -> &BuildSettings {
        &self.build
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Declared targets, or a single target named after the package
    pub fn targets(&self) -> Vec<TargetDecl> {
        if self.targets.is_empty() {
            vec![TargetDecl::new(self.name.clone(), self.kind)]
        } else {
            self.targets.clone()
        }
    }

    /// `name@version`, used in diagnostics
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}
