//! Build order computation for package dependencies

use crate::resolver::ResolvedSet;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BuildOrderError {
    #[error("Circular dependency detected among: {}", .0.join(", "))]
    CircularDependency(Vec<String>),

    #[error("Missing dependency: '{dependency}' required by '{package}'")]
    MissingDependency { package: String, dependency: String },
}

pub type BuildOrderResult<T> = Result<T, BuildOrderError>;

/// Build order computer using topological sort
///
/// Ties are broken by name so the order is stable across runs.
pub struct BuildOrderComputer {
    /// Dependency graph: package -> dependencies
    graph: BTreeMap<String, Vec<String>>,
}

impl BuildOrderComputer {
    /// Create a new build order computer from a resolved set
    pub fn new(resolved: &ResolvedSet) -> Self {
        let graph = resolved
            .iter()
            .map(|p| (p.name().to_string(), p.dependencies.clone()))
            .collect();
        Self { graph }
    }

    /// Create from a raw dependency graph
    pub fn from_graph(graph: BTreeMap<String, Vec<String>>) -> Self {
        Self { graph }
    }

    fn check_missing(&self) -> BuildOrderResult<()> {
        for (package, deps) in &self.graph {
            if let Some(dep) = deps.iter().find(|d| !self.graph.contains_key(*d)) {
                return Err(BuildOrderError::MissingDependency {
                    package: package.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        Ok(())
    }

    /// Reverse edges: package -> packages that depend on it
    fn dependents(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (package, deps) in &self.graph {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(package.as_str());
            }
        }
        dependents
    }

    /// Compute topological build order using Kahn's algorithm
    ///
    /// Dependencies come before their dependents.
    pub fn compute_build_order(&self) -> BuildOrderResult<Vec<String>> {
        self.check_missing()?;

        let dependents = self.dependents();
        let mut in_degree: BTreeMap<&str, usize> = self
            .graph
            .iter()
            .map(|(package, deps)| (package.as_str(), deps.len()))
            .collect();
        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(package, _)| *package)
            .collect();
        let mut result = Vec::with_capacity(self.graph.len());

        while let Some(package) = ready.pop_first() {
            result.push(package.to_string());

            for dependent in dependents.get(package).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if result.len() != self.graph.len() {
            let stuck = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(package, _)| package.to_string())
                .collect();
            return Err(BuildOrderError::CircularDependency(stuck));
        }

        Ok(result)
    }

    /// Find packages that can be built in parallel
    /// Returns groups where each group can be built in parallel
    pub fn parallel_build_groups(&self) -> BuildOrderResult<Vec<Vec<String>>> {
        self.check_missing()?;

        let mut groups = Vec::new();
        let mut built: BTreeSet<&str> = BTreeSet::new();

        loop {
            let group: Vec<&str> = self
                .graph
                .iter()
                .filter(|(package, _)| !built.contains(package.as_str()))
                .filter(|(_, deps)| deps.iter().all(|d| built.contains(d.as_str())))
                .map(|(package, _)| package.as_str())
                .collect();

            if group.is_empty() {
                break;
            }

            built.extend(group.iter().copied());
            groups.push(group.into_iter().map(String::from).collect());
        }

        if built.len() != self.graph.len() {
            let stuck = self
                .graph
                .keys()
                .filter(|p| !built.contains(p.as_str()))
                .cloned()
                .collect();
            return Err(BuildOrderError::CircularDependency(stuck));
        }

        Ok(groups)
    }

    /// Get dependencies for a specific package
    pub fn get_dependencies(&self, package: &str) -> Option<&Vec<String>> {
        self.graph.get(package)
    }

    /// Get all packages in the graph, sorted
    pub fn packages(&self) -> Vec<String> {
        self.graph.keys().cloned().collect()
    }

    pub fn package_count(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}
