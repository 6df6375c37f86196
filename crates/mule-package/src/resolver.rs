use crate::manifest::Package;
use crate::universe::PackageSource;
use semver::Version;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;

pub mod conflict;
mod cycle;
mod search;
mod version_solver;

pub use conflict::{Conflict, ConflictingConstraint};
pub use version_solver::VersionSolver;

use cycle::DeclarationGraph;
use search::Search;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("{0}")]
    Conflict(Conflict),

    #[error("Package not found: '{package}' (required by {required_by})")]
    MissingPackage {
        package: String,
        required_by: String,
    },

    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("Resolution gave up after {steps} decisions")]
    StepLimitExceeded { steps: usize },
}

pub type ResolverResult<T> = Result<T, ResolverError>;

/// Resolver tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Upper bound on decisions, backtracked ones included
    pub max_steps: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { max_steps: 100_000 }
    }
}

/// Backtracking dependency resolver
///
/// Picks the highest version of each package that satisfies every range
/// declared by the versions already selected, revisiting earlier choices
/// when a later package cannot be satisfied.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the dependency closure of `root` against `universe`
    ///
    /// Deterministic: the same root and universe always produce the same set.
    pub fn resolve<S>(&self, root: &Package, universe: &S) -> ResolverResult<ResolvedSet>
    where
        S: PackageSource + ?Sized,
    {
        tracing::info!("Resolving dependencies for {}", root.id());
        let mut solver = VersionSolver::new(universe);

        let graph = DeclarationGraph::collect(root, &mut solver);
        if let Some(cycle) = graph.find_cycle() {
            return Err(ResolverError::Cycle { cycle });
        }
        tracing::debug!("Declaration graph has {} package(s)", graph.node_count());

        let mut search = Search::new(&mut solver, self.config.max_steps);
        let chosen = search.run(root)?;
        tracing::debug!("Search finished after {} step(s)", search.steps());

        Ok(ResolvedSet::from_chosen(root.name(), chosen))
    }
}

/// Resolve with the default configuration
pub fn resolve<S>(root: &Package, universe: &S) -> ResolverResult<ResolvedSet>
where
    S: PackageSource + ?Sized,
{
    Resolver::new().resolve(root, universe)
}

/// One selected package version and the names it depends on
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPackage {
    pub package: Arc<Package>,
    pub dependencies: Vec<String>,
}

impl ResolvedPackage {
    pub fn new(package: Arc<Package>) -> Self {
        let mut dependencies: Vec<String> = Vec::new();
        for dep in package.dependencies() {
            if !dependencies.contains(&dep.name) {
                dependencies.push(dep.name.clone());
            }
        }
        Self {
            package,
            dependencies,
        }
    }

    pub fn name(&self) -> &str {
        self.package.name()
    }

    pub fn version(&self) -> &Version {
        self.package.version()
    }
}

/// Resolved dependency set with exact versions, the root included
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSet {
    root: String,
    packages: BTreeMap<String, ResolvedPackage>,
}

impl ResolvedSet {
    fn from_chosen(root: &str, chosen: BTreeMap<String, Arc<Package>>) -> Self {
        let packages = chosen
            .into_iter()
            .map(|(name, package)| (name, ResolvedPackage::new(package)))
            .collect();
        Self {
            root: root.to_string(),
            packages,
        }
    }

    /// Name of the root package
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn root_package(&self) -> Option<&ResolvedPackage> {
        self.packages.get(&self.root)
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedPackage> {
        self.packages.get(name)
    }

    pub fn version(&self, name: &str) -> Option<&Version> {
        self.packages.get(name).map(ResolvedPackage::version)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Packages in name order
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.packages.values()
    }

    /// Every package reachable from `name`, breadth-first in declaration order
    pub fn transitive_dependencies(&self, name: &str) -> Vec<&ResolvedPackage> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        let mut out = Vec::new();

        if let Some(entry) = self.packages.get(name) {
            queue.extend(entry.dependencies.iter().map(String::as_str));
        }
        while let Some(dep) = queue.pop_front() {
            if dep == name || !seen.insert(dep) {
                continue;
            }
            if let Some(entry) = self.packages.get(dep) {
                out.push(entry);
                queue.extend(entry.dependencies.iter().map(String::as_str));
            }
        }
        out
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::MemoryUniverse;
    use crate::version::VersionRange;
    use pretty_assertions::assert_eq;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn r(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    fn pkg(name: &str, version: &str, deps: &[(&str, &str)]) -> Package {
        deps.iter().fold(Package::new(name, v(version)), |p, (n, range)| {
            p.with_dependency(*n, r(range))
        })
    }

    #[test]
    fn test_picks_highest_compatible() {
        let universe = MemoryUniverse::new()
            .with(pkg("a", "1.0.0", &[]))
            .with(pkg("a", "1.5.0", &[("b", ">=2.0")]))
            .with(pkg("a", "2.0.0", &[]))
            .with(pkg("b", "1.9.0", &[]))
            .with(pkg("b", "2.0.0", &[]));
        let root = pkg("root", "0.1.0", &[("a", ">=1.0, <2.0")]);

        let resolved = resolve(&root, &universe).unwrap();
        assert_eq!(resolved.version("a"), Some(&v("1.5.0")));
        assert_eq!(resolved.version("b"), Some(&v("2.0.0")));
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved.root(), "root");
        assert_eq!(resolved.get("a").unwrap().dependencies, vec!["b"]);
    }

    #[test]
    fn test_transitive_dependencies() {
        let universe = MemoryUniverse::new()
            .with(pkg("a", "1.0.0", &[("c", "*")]))
            .with(pkg("b", "1.0.0", &[("c", "*")]))
            .with(pkg("c", "1.0.0", &[]));
        let root = pkg("root", "0.1.0", &[("b", "*"), ("a", "*")]);

        let resolved = resolve(&root, &universe).unwrap();
        let names: Vec<&str> = resolved
            .transitive_dependencies("root")
            .into_iter()
            .map(ResolvedPackage::name)
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(resolved.transitive_dependencies("c").is_empty());
    }

    #[test]
    fn test_step_limit() {
        let universe = MemoryUniverse::new()
            .with(pkg("a", "1.0.0", &[]))
            .with(pkg("b", "1.0.0", &[]));
        let root = pkg("root", "0.1.0", &[("a", "*"), ("b", "*")]);

        let resolver = Resolver::with_config(ResolverConfig { max_steps: 1 });
        let err = resolver.resolve(&root, &universe).unwrap_err();
        assert!(matches!(err, ResolverError::StepLimitExceeded { steps: 1 }));
    }

    #[test]
    fn test_cycle_error_message() {
        let err = ResolverError::Cycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
    }
}
