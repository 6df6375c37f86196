//! Package lockfile (mule.lock) for reproducible builds

use crate::manifest::{Dependency, Package, PackageManifest};
use crate::resolver::ResolvedSet;
use crate::universe::{MemoryUniverse, PackageSource};
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Lockfile name next to the root manifest
pub const LOCKFILE_NAME: &str = "mule.lock";

/// Lockfile structure (mule.lock)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lockfile {
    /// Lockfile format version
    pub version: u32,
    /// Resolved packages, sorted by name
    #[serde(default)]
    pub packages: Vec<LockedPackage>,
    #[serde(default)]
    pub metadata: LockfileMetadata,
}

impl Lockfile {
    /// Current lockfile format version
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            packages: Vec::new(),
            metadata: LockfileMetadata::default(),
        }
    }

    /// Lock every package of a resolution, the root excluded
    pub fn from_resolved(resolved: &ResolvedSet) -> Self {
        let mut lockfile = Self::new();

        for entry in resolved.iter().filter(|p| p.name() != resolved.root()) {
            let dependencies = entry
                .dependencies
                .iter()
                .filter_map(|dep| resolved.version(dep).map(|v| (dep.clone(), v.clone())))
                .collect();

            lockfile.add_package(LockedPackage {
                name: entry.name().to_string(),
                version: entry.version().clone(),
                source: LockedSource::Registry { registry: None },
                checksum: Some(package_checksum(&entry.package)),
                dependencies,
            });
        }

        lockfile.metadata = LockfileMetadata {
            generated_at: Some(
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ),
            mule_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        };

        lockfile
    }

    /// Record git and path sources declared by the root manifest
    pub fn apply_sources(&mut self, manifest: &PackageManifest) {
        for package in &mut self.packages {
            if let Some(dep) = manifest.dependencies.get(&package.name) {
                if let Some(source) = LockedSource::from_dependency(dep) {
                    package.source = source;
                }
            }
        }
    }

    /// Parse lockfile from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load lockfile from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_str(&content)?)
    }

    /// Serialize to TOML string
    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Write lockfile to file
    pub fn write_to_file(&self, path: &Path) -> crate::Result<()> {
        let content = self.to_string()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Add or update a locked package
    pub fn add_package(&mut self, package: LockedPackage) {
        self.packages.retain(|p| p.name != package.name);
        self.packages.push(package);
        self.packages.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Get locked package by name
    pub fn get_package(&self, name: &str) -> Option<&LockedPackage> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Verify lockfile integrity
    pub fn verify(&self) -> Result<(), String> {
        if self.version > Self::VERSION {
            return Err(format!(
                "Lockfile version {} is newer than supported version {}",
                self.version,
                Self::VERSION
            ));
        }

        let mut seen = HashSet::new();
        for pkg in &self.packages {
            if !seen.insert(&pkg.name) {
                return Err(format!("Duplicate package in lockfile: {}", pkg.name));
            }
        }

        Ok(())
    }

    /// True when every range the root declares still admits the locked version
    pub fn satisfies(&self, root: &Package) -> bool {
        if self.verify().is_err() {
            return false;
        }

        root.dependencies().iter().all(|dep| {
            self.get_package(&dep.name)
                .is_some_and(|locked| dep.range.contains(&locked.version))
        })
    }

    /// Restrict `universe` to the locked versions
    ///
    /// Resolving against the result reproduces the locked set. A locked
    /// package whose checksum no longer matches is left out, so the resolver
    /// reports it instead of silently building something else.
    pub fn pinned<S: PackageSource + ?Sized>(&self, universe: &S) -> MemoryUniverse {
        let mut pinned = MemoryUniverse::new();

        for locked in &self.packages {
            let candidate = universe
                .versions(&locked.name)
                .into_iter()
                .find(|p| p.version() == &locked.version);

            match candidate {
                Some(package) if locked.matches(&package) => {
                    pinned.add(package.as_ref().clone());
                }
                Some(_) => {
                    tracing::warn!(
                        "Checksum mismatch for locked {}@{}",
                        locked.name,
                        locked.version
                    );
                }
                None => {
                    tracing::warn!(
                        "Locked {}@{} is no longer available",
                        locked.name,
                        locked.version
                    );
                }
            }
        }

        pinned
    }
}

impl Default for Lockfile {
    fn default() -> Self {
        Self::new()
    }
}

/// Locked package entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockedPackage {
    pub name: String,
    /// Resolved version
    pub version: Version,
    pub source: LockedSource,
    /// SHA-256 of the package declaration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Direct dependencies (name -> version)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Version>,
}

impl LockedPackage {
    /// True when `package` is the version this entry locked
    pub fn matches(&self, package: &Package) -> bool {
        package.name() == self.name
            && package.version() == &self.version
            && self
                .checksum
                .as_ref()
                .map_or(true, |sum| *sum == package_checksum(package))
    }
}

/// Locked dependency source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LockedSource {
    /// Registry source
    Registry {
        #[serde(skip_serializing_if = "Option::is_none")]
        registry: Option<String>,
    },
    /// Git source
    Git {
        url: String,
        /// Commit, tag or `HEAD`
        rev: String,
    },
    /// Path source
    Path { path: PathBuf },
}

impl LockedSource {
    /// Source declared by a manifest dependency, if it is not the registry
    pub fn from_dependency(dep: &Dependency) -> Option<Self> {
        let Dependency::Detailed(detailed) = dep else {
            return None;
        };

        if let Some(url) = &detailed.git {
            let rev = detailed
                .commit
                .clone()
                .or_else(|| detailed.tag.clone())
                .unwrap_or_else(|| "HEAD".to_string());
            return Some(LockedSource::Git {
                url: url.clone(),
                rev,
            });
        }

        detailed
            .path
            .as_ref()
            .map(|path| LockedSource::Path { path: path.clone() })
    }
}

/// Lockfile metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LockfileMetadata {
    /// When lockfile was generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    /// Mule version used to generate lockfile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mule_version: Option<String>,
}

/// SHA-256 over a package's identity and declared dependency ranges
pub fn package_checksum(package: &Package) -> String {
    let mut hasher = Sha256::new();
    hasher.update(package.id().as_bytes());
    for dep in package.dependencies() {
        hasher.update(b"\0");
        hasher.update(dep.name.as_bytes());
        hasher.update(b" ");
        hasher.update(dep.range.to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
