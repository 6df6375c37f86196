//! Project context shared by the commands
//!
//! Finds the project, merges configuration with command-line overrides, and
//! resolves dependencies through mule.lock.

use anyhow::{anyhow, bail, Context, Result};
use mule_config::{Config, ConfigLoader, GlobalConfig};
use mule_package::{
    resolve, DirectoryRegistry, Lockfile, Package, PackageManifest, PathOverlay, ResolvedSet,
    ResolverError, LOCKFILE_NAME, MANIFEST_FILE,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A loaded project
pub struct Project {
    pub config: Config,
    pub root_dir: PathBuf,
    pub manifest: PackageManifest,
    pub package: Package,
}

impl Project {
    /// Find and load the project containing `start_dir`
    ///
    /// `overrides` holds command-line settings; they win over the global
    /// config and the environment.
    pub fn load(start_dir: &Path, overrides: &GlobalConfig) -> Result<Self> {
        overrides.validate()?;
        let mut config = ConfigLoader::new()
            .load_from_directory(start_dir)
            .context("Failed to load configuration")?;
        config.settings.merge(overrides);

        let Some(root_dir) = config.project_root().map(Path::to_path_buf) else {
            bail!(
                "could not find {} in {} or any parent directory",
                MANIFEST_FILE,
                start_dir.display()
            );
        };

        let manifest_path = root_dir.join(MANIFEST_FILE);
        let manifest = PackageManifest::from_file(&manifest_path)
            .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
        let package = manifest
            .clone()
            .into_package(Some(&root_dir))
            .with_context(|| format!("Invalid manifest {}", manifest_path.display()))?;

        debug!("Loaded {} from {}", package.id(), root_dir.display());
        Ok(Self {
            config,
            root_dir,
            manifest,
            package,
        })
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.root_dir.join(LOCKFILE_NAME)
    }

    /// Path dependencies over the configured registry
    fn source(&self) -> Result<PathOverlay<DirectoryRegistry>> {
        let registry = match self.config.registry() {
            Some(dir) => dir,
            None => self.root_dir.join(".mule").join("registry"),
        };
        debug!("Using registry {}", registry.display());
        PathOverlay::collect(&self.package, DirectoryRegistry::new(registry))
            .context("Failed to load path dependencies")
    }

    /// Resolve dependencies, preferring the versions in mule.lock
    ///
    /// With `locked`, a missing or stale lockfile is an error; otherwise a
    /// fresh resolution rewrites it.
    pub fn resolve(&self, locked: bool) -> Result<ResolvedSet> {
        let source = self.source()?;
        let lock_path = self.lockfile_path();

        let existing = if lock_path.exists() {
            Some(
                Lockfile::from_file(&lock_path)
                    .with_context(|| format!("Failed to read {}", lock_path.display()))?,
            )
        } else {
            None
        };

        match existing {
            Some(lock) if lock.satisfies(&self.package) => match resolve(&self.package, &lock.pinned(&source)) {
                Ok(resolved) => {
                    debug!("Using {} locked package(s)", lock.packages.len());
                    return Ok(resolved);
                }
                Err(e) if locked => {
                    return Err(resolution_error(e)).context(format!("{} cannot be used as is", LOCKFILE_NAME));
                }
                Err(e) => warn!("Ignoring {}: {}", LOCKFILE_NAME, e),
            },
            Some(_) if locked => {
                bail!(
                    "{} does not satisfy the dependencies in {}; run `mule lock`",
                    LOCKFILE_NAME,
                    MANIFEST_FILE
                );
            }
            None if locked => bail!("{} not found; run `mule lock`", LOCKFILE_NAME),
            _ => {}
        }

        let resolved = self.resolve_fresh_with(&source)?;
        self.write_lockfile(&resolved)?;
        Ok(resolved)
    }

    /// Resolve against the registry, ignoring mule.lock
    pub fn resolve_fresh(&self) -> Result<ResolvedSet> {
        let source = self.source()?;
        self.resolve_fresh_with(&source)
    }

    fn resolve_fresh_with(&self, source: &PathOverlay<DirectoryRegistry>) -> Result<ResolvedSet> {
        let resolved = resolve(&self.package, source)
            .map_err(resolution_error)
            .with_context(|| format!("Failed to resolve dependencies of {}", self.package.id()))?;
        info!("Resolved {} package(s)", resolved.len());
        Ok(resolved)
    }

    pub fn write_lockfile(&self, resolved: &ResolvedSet) -> Result<()> {
        let mut lockfile = Lockfile::from_resolved(resolved);
        lockfile.apply_sources(&self.manifest);
        let path = self.lockfile_path();
        lockfile
            .write_to_file(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Conflicts get the multi-line report with requirement paths
fn resolution_error(error: ResolverError) -> anyhow::Error {
    match error {
        ResolverError::Conflict(conflict) => anyhow!("{}", conflict.report().trim_end()),
        other => other.into(),
    }
}
