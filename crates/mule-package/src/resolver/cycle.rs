//! Cycle detection over the declaration graph
//!
//! The declaration graph has one node per package name and an edge `a -> b`
//! whenever any available version of `a` declares a dependency on `b`. It is
//! checked before the search so a cycle is reported as such instead of
//! surfacing as an exhausted search.

use super::version_solver::VersionSolver;
use crate::manifest::Package;
use crate::universe::PackageSource;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Declared dependency names per package name
pub(super) struct DeclarationGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
    root: String,
}

impl DeclarationGraph {
    /// Collect every name reachable from `root` through any candidate version
    pub(super) fn collect<S: PackageSource + ?Sized>(
        root: &Package,
        solver: &mut VersionSolver<'_, S>,
    ) -> Self {
        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let root_deps: BTreeSet<String> =
            root.dependencies().iter().map(|d| d.name.clone()).collect();

        let mut queue: VecDeque<String> = root_deps.iter().cloned().collect();
        edges.insert(root.name().to_string(), root_deps);

        while let Some(name) = queue.pop_front() {
            if edges.contains_key(&name) {
                continue;
            }
            let deps: BTreeSet<String> = solver
                .get_versions(&name)
                .iter()
                .flat_map(|p| p.dependencies().iter().map(|d| d.name.clone()))
                .collect();
            queue.extend(deps.iter().filter(|d| !edges.contains_key(*d)).cloned());
            edges.insert(name, deps);
        }

        Self {
            edges,
            root: root.name().to_string(),
        }
    }

    pub(super) fn node_count(&self) -> usize {
        self.edges.len()
    }

    /// First cycle reachable from the root, as a closed path `a -> b -> a`
    pub(super) fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();
        self.dfs_find_cycle(&self.root, &mut visited, &mut rec_stack, &mut path)
    }

    fn dfs_find_cycle(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if rec_stack.contains(name) {
            let start = path.iter().position(|n| n == name).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            return Some(cycle);
        }

        if visited.contains(name) {
            return None;
        }

        visited.insert(name.to_string());
        rec_stack.insert(name.to_string());
        path.push(name.to_string());

        if let Some(deps) = self.edges.get(name) {
            for dep in deps {
                if let Some(cycle) = self.dfs_find_cycle(dep, visited, rec_stack, path) {
                    return Some(cycle);
                }
            }
        }

        rec_stack.remove(name);
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::MemoryUniverse;
    use crate::version::VersionRange;
    use semver::Version;

    fn pkg(name: &str, version: (u64, u64, u64), deps: &[&str]) -> Package {
        deps.iter().fold(
            Package::new(name, Version::new(version.0, version.1, version.2)),
            |p, d| p.with_dependency(*d, VersionRange::any()),
        )
    }

    #[test]
    fn test_acyclic_graph() {
        let universe = MemoryUniverse::new()
            .with(pkg("a", (1, 0, 0), &["b"]))
            .with(pkg("b", (1, 0, 0), &[]));
        let root = pkg("root", (0, 1, 0), &["a", "b"]);

        let mut solver = VersionSolver::new(&universe);
        let graph = DeclarationGraph::collect(&root, &mut solver);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.find_cycle(), None);
    }

    #[test]
    fn test_cycle_through_older_version() {
        // Only a@1.0.0 points back at b; it still counts
        let universe = MemoryUniverse::new()
            .with(pkg("a", (1, 0, 0), &["b"]))
            .with(pkg("a", (2, 0, 0), &[]))
            .with(pkg("b", (1, 0, 0), &["a"]));
        let root = pkg("root", (0, 1, 0), &["a"]);

        let mut solver = VersionSolver::new(&universe);
        let graph = DeclarationGraph::collect(&root, &mut solver);
        assert_eq!(
            graph.find_cycle(),
            Some(vec!["a".to_string(), "b".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_unknown_names_have_no_edges() {
        let universe = MemoryUniverse::new();
        let root = pkg("root", (0, 1, 0), &["ghost"]);

        let mut solver = VersionSolver::new(&universe);
        let graph = DeclarationGraph::collect(&root, &mut solver);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.find_cycle(), None);
    }
}
