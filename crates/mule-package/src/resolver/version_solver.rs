use crate::manifest::Package;
use crate::universe::PackageSource;
use crate::version::VersionRange;
use std::collections::HashMap;
use std::sync::Arc;

/// Version solver for finding compatible package versions
///
/// Memoizes universe lookups so each name is queried once per resolution,
/// keeping candidates sorted highest-first.
pub struct VersionSolver<'a, S: PackageSource + ?Sized> {
    universe: &'a S,
    available_versions: HashMap<String, Vec<Arc<Package>>>,
}

impl<'a, S: PackageSource + ?Sized> VersionSolver<'a, S> {
    pub fn new(universe: &'a S) -> Self {
        Self {
            universe,
            available_versions: HashMap::new(),
        }
    }

    /// Every available version of `package`, highest first
    pub fn get_versions(&mut self, package: &str) -> &[Arc<Package>] {
        let universe = self.universe;
        self.available_versions
            .entry(package.to_string())
            .or_insert_with(|| {
                let mut versions = universe.versions(package);
                versions.sort_by(|a, b| b.version().cmp(a.version()));
                versions.dedup_by(|a, b| a.version() == b.version());
                versions
            })
    }

    /// True when the universe knows at least one version of `package`
    pub fn is_known(&mut self, package: &str) -> bool {
        !self.get_versions(package).is_empty()
    }

    /// Find all versions satisfying `range`, highest first
    pub fn find_all_satisfying(&mut self, package: &str, range: &VersionRange) -> Vec<Arc<Package>> {
        self.get_versions(package)
            .iter()
            .filter(|p| range.contains(p.version()))
            .cloned()
            .collect()
    }
}
