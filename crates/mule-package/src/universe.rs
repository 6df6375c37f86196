//! Candidate universe: where the resolver looks up available package versions

use crate::manifest::{load_package, Package};
use crate::Result;
use semver::Version;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Manifest file name inside a package directory
pub const MANIFEST_FILE: &str = "mule.toml";

/// Source of candidate package versions
///
/// Implementations are treated as pure lookups; caching and retries are the
/// implementation's concern.
pub trait PackageSource {
    /// Every available version of `name`, in any order
    fn versions(&self, name: &str) -> Vec<Arc<Package>>;
}

impl<T: PackageSource + ?Sized> PackageSource for &T {
    fn versions(&self, name: &str) -> Vec<Arc<Package>> {
        (**self).versions(name)
    }
}

/// In-memory universe
#[derive(Debug, Clone, Default)]
pub struct MemoryUniverse {
    packages: HashMap<String, BTreeMap<Version, Arc<Package>>>,
}

impl MemoryUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package version, replacing an existing entry for the same version
    pub fn add(&mut self, package: Package) -> &mut Self {
        self.packages
            .entry(package.name().to_string())
            .or_default()
            .insert(package.version().clone(), Arc::new(package));
        self
    }

    /// Builder-style registration
    pub fn with(mut self, package: Package) -> Self {
        self.add(package);
        self
    }

    pub fn package_count(&self) -> usize {
        self.packages.values().map(BTreeMap::len).sum()
    }
}

impl PackageSource for MemoryUniverse {
    fn versions(&self, name: &str) -> Vec<Arc<Package>> {
        self.packages
            .get(name)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Registry laid out on disk as `<root>/<name>/<version>/mule.toml`
///
/// Unreadable or malformed manifests are skipped with a warning so one bad
/// entry cannot hide the rest of the registry.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_version(&self, name: &str, dir: &Path) -> Option<Arc<Package>> {
        let manifest_path = dir.join(MANIFEST_FILE);
        match load_package(&manifest_path) {
            Ok(package) if package.name() == name => Some(Arc::new(package)),
            Ok(package) => {
                tracing::warn!(
                    "Registry entry {} declares package '{}', expected '{}'",
                    manifest_path.display(),
                    package.name(),
                    name
                );
                None
            }
            Err(e) => {
                tracing::warn!("Skipping registry entry {}: {}", manifest_path.display(), e);
                None
            }
        }
    }
}

impl PackageSource for DirectoryRegistry {
    fn versions(&self, name: &str) -> Vec<Arc<Package>> {
        let package_dir = self.root.join(name);
        let Ok(entries) = std::fs::read_dir(&package_dir) else {
            return Vec::new();
        };

        let mut found: Vec<Arc<Package>> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| self.load_version(name, &entry.path()))
            .collect();

        found.sort_by(|a, b| a.version().cmp(b.version()));
        tracing::debug!("Registry has {} version(s) of {}", found.len(), name);
        found
    }
}

/// Path dependencies layered over another source
///
/// A package reachable through `path = "..."` declarations shadows every
/// version `fallback` offers under the same name.
#[derive(Debug, Clone)]
pub struct PathOverlay<S> {
    local: MemoryUniverse,
    fallback: S,
}

impl<S: PackageSource> PathOverlay<S> {
    /// Load every path dependency reachable from `root`
    ///
    /// Paths are taken relative to the declaring package's directory.
    pub fn collect(root: &Package, fallback: S) -> Result<Self> {
        let mut local = MemoryUniverse::new();
        let mut pending: Vec<Package> = vec![root.clone()];
        let mut seen: HashSet<PathBuf> = HashSet::new();

        while let Some(package) = pending.pop() {
            let base = package.root().map(Path::to_path_buf).unwrap_or_default();
            for dep in package.dependencies() {
                let Some(path) = &dep.path else {
                    continue;
                };
                let dir = base.join(path);
                if !seen.insert(dir.clone()) {
                    continue;
                }
                let loaded = load_package(&dir.join(MANIFEST_FILE))?;
                tracing::debug!("Path dependency {} at {}", loaded.id(), dir.display());
                local.add(loaded.clone());
                pending.push(loaded);
            }
        }

        Ok(Self { local, fallback })
    }

    /// Number of packages loaded from paths
    pub fn local_count(&self) -> usize {
        self.local.package_count()
    }
}

impl<S: PackageSource> PackageSource for PathOverlay<S> {
    fn versions(&self, name: &str) -> Vec<Arc<Package>> {
        let local = self.local.versions(name);
        if local.is_empty() {
            self.fallback.versions(name)
        } else {
            local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_manifest(root: &Path, name: &str, version: &str, extra: &str) {
        let dir = root.join(name).join(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(MANIFEST_FILE),
            format!(
                "[package]\nname = \"{}\"\nversion = \"{}\"\n{}",
                name, version, extra
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_memory_universe() {
        let universe = MemoryUniverse::new()
            .with(Package::new("a", Version::new(1, 0, 0)))
            .with(Package::new("a", Version::new(1, 5, 0)));

        assert_eq!(universe.versions("a").len(), 2);
        assert!(universe.versions("b").is_empty());
        assert_eq!(universe.package_count(), 2);
    }

    #[test]
    fn test_directory_registry() {
        let temp = TempDir::new().unwrap();
        write_manifest(temp.path(), "fmt", "10.0.0", "");
        write_manifest(temp.path(), "fmt", "9.1.0", "");
        write_manifest(temp.path(), "fmt", "8.0.0", "[dependencies]\nbad = \">=nope\"\n");

        let registry = DirectoryRegistry::new(temp.path());
        let versions: Vec<String> = registry
            .versions("fmt")
            .iter()
            .map(|p| p.version().to_string())
            .collect();

        assert_eq!(versions, vec!["9.1.0", "10.0.0"]);
        assert!(registry.versions("missing").is_empty());

        let pkg = &registry.versions("fmt")[0];
        assert_eq!(pkg.root(), Some(temp.path().join("fmt").join("9.1.0").as_path()));
    }

    #[test]
    fn test_path_overlay_shadows_registry() {
        let temp = TempDir::new().unwrap();
        write_manifest(temp.path(), "util", "2.0.0", "");

        let app = temp.path().join("app");
        let util = temp.path().join("vendor").join("util");
        fs::create_dir_all(&app).unwrap();
        fs::create_dir_all(&util).unwrap();
        fs::write(
            app.join(MANIFEST_FILE),
            "[package]\nname = \"app\"\nversion = \"0.1.0\"\n\n[dependencies]\nutil = { version = \"^1\", path = \"../vendor/util\" }\n",
        )
        .unwrap();
        fs::write(
            util.join(MANIFEST_FILE),
            "[package]\nname = \"util\"\nversion = \"1.3.0\"\n",
        )
        .unwrap();

        let root = load_package(&app.join(MANIFEST_FILE)).unwrap();
        let overlay = PathOverlay::collect(&root, DirectoryRegistry::new(temp.path())).unwrap();
        assert_eq!(overlay.local_count(), 1);

        let versions = overlay.versions("util");
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version(), &Version::new(1, 3, 0));
        assert!(overlay.versions("fmt").is_empty());
    }
}
