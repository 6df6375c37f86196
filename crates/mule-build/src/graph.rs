//! Task graph construction
//!
//! Turns a resolved package set and its source index into an arena of compile
//! and link tasks. Tasks are stored in topological order: every predecessor of
//! a task has a smaller id. Test binaries are only planned when test sources
//! are handed to [`GraphBuilder::with_tests`].

use crate::error::GraphError;
use crate::fingerprint::{Fingerprint, FingerprintBuilder};
use crate::profile::ProfileConfig;
use crate::source::{include_dirs, is_entry_point, SourceIndex, SourceUnit, TESTS_DIR};
use mule_package::{Package, ResolvedSet, TargetDecl, TargetKind};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::ops::Index;
use std::path::{Path, PathBuf};

/// Index of a task in its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a task does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Compile one translation unit to an object file
    Compile { source: PathBuf, relative: PathBuf },
    /// Link a target
    ///
    /// Predecessors are ordered: `objects` compile tasks first, then
    /// `libraries` library link tasks, then targets that only need to be
    /// built first. Libraries come before the libraries they depend on.
    Link {
        target: String,
        kind: TargetKind,
        objects: usize,
        libraries: usize,
        /// A test binary rather than a declared target
        test: bool,
    },
}

impl TaskKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Compile { .. } => "compile",
            Self::Link { .. } => "link",
        }
    }
}

/// A node of the build graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    /// `compile:<pkg>:<path>` or `link:<pkg>:<target>`
    pub key: String,
    pub package: String,
    pub kind: TaskKind,
    pub predecessors: Vec<TaskId>,
    pub flags: Vec<String>,
    pub fingerprint: Fingerprint,
}

impl Task {
    pub fn is_compile(&self) -> bool {
        matches!(self.kind, TaskKind::Compile { .. })
    }

    pub fn is_test(&self) -> bool {
        matches!(self.kind, TaskKind::Link { test: true, .. })
    }

    /// Split inputs (ordered like `predecessors`) into objects and libraries
    pub fn split_inputs<'a, T>(&self, inputs: &'a [T]) -> (&'a [T], &'a [T]) {
        match &self.kind {
            TaskKind::Compile { .. } => (&inputs[..0], &inputs[..0]),
            TaskKind::Link {
                objects, libraries, ..
            } => {
                let objects = (*objects).min(inputs.len());
                let libraries = (objects + libraries).min(inputs.len());
                (&inputs[..objects], &inputs[objects..libraries])
            }
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Immutable task arena with a key index
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    tasks: Vec<Task>,
    index: BTreeMap<String, TaskId>,
    dependents: Vec<Vec<TaskId>>,
    tests: Vec<TaskId>,
}

impl BuildGraph {
    fn push(
        &mut self,
        key: String,
        package: &str,
        kind: TaskKind,
        predecessors: Vec<TaskId>,
        flags: Vec<String>,
        fingerprint: Fingerprint,
    ) -> TaskId {
        let id = TaskId(self.tasks.len());
        for pred in &predecessors {
            self.dependents[pred.0].push(id);
        }
        self.index.insert(key.clone(), id);
        self.dependents.push(Vec::new());
        self.tasks.push(Task {
            id,
            key,
            package: package.to_string(),
            kind,
            predecessors,
            flags,
            fingerprint,
        });
        id
    }

    /// Tasks in topological order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0)
    }

    pub fn by_key(&self, key: &str) -> Option<&Task> {
        self.index.get(key).map(|id| &self.tasks[id.0])
    }

    /// Link tasks of test binaries, in test source order
    pub fn tests(&self) -> &[TaskId] {
        &self.tests
    }

    /// Tasks that list `id` as a predecessor
    pub fn dependents(&self, id: TaskId) -> &[TaskId] {
        self.dependents.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().map(|t| t.id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Index<TaskId> for BuildGraph {
    type Output = Task;

    fn index(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }
}

/// One declared target while the graph is being planned
struct TargetNode<'a> {
    package: &'a Package,
    decl: TargetDecl,
    inputs: Vec<&'a SourceUnit>,
    /// Keys of explicitly required targets
    requires: Vec<String>,
    /// Keys of library targets of the package's dependencies
    dep_libraries: Vec<String>,
}

impl TargetNode<'_> {
    fn edges(&self) -> impl DoubleEndedIterator<Item = &String> {
        self.requires.iter().chain(self.dep_libraries.iter())
    }
}

fn target_key(package: &str, target: &str) -> String {
    format!("{}:{}", package, target)
}

/// Builds a [`BuildGraph`] from a resolved set
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    profile: ProfileConfig,
    /// Test sources of the root package
    tests: Vec<SourceUnit>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: ProfileConfig) -> Self {
        self.profile = profile;
        self
    }

    /// Also plan one test binary per unit, linked against the root package
    pub fn with_tests(mut self, tests: Vec<SourceUnit>) -> Self {
        self.tests = tests;
        self
    }

    pub fn build(&self, resolved: &ResolvedSet, sources: &SourceIndex) -> Result<BuildGraph, GraphError> {
        let closures: BTreeMap<&str, Vec<&Package>> = resolved
            .iter()
            .map(|entry| {
                let deps: Vec<&Package> = resolved
                    .transitive_dependencies(entry.name())
                    .into_iter()
                    .map(|dep| dep.package.as_ref())
                    .collect();
                (entry.name(), deps)
            })
            .collect();

        let nodes = plan_targets(resolved, sources, &closures)?;
        if let Some(cycle) = find_cycle(&nodes) {
            return Err(GraphError::Cycle { cycle });
        }
        let order = topological_order(&nodes);

        let mut graph = BuildGraph::default();

        // Compile tasks: one per source unit, packages in name order
        let mut objects: BTreeMap<(&str, &Path), TaskId> = BTreeMap::new();
        for entry in resolved.iter() {
            let package = entry.package.as_ref();
            let units = sources
                .get(package.name())
                .ok_or_else(|| GraphError::MissingSources {
                    package: package.name().to_string(),
                })?;
            let flags = self.compile_flags(package, &closures[package.name()]);

            for unit in units {
                let fingerprint = compile_fingerprint(unit, &flags);
                let id = graph.push(
                    format!("compile:{}:{}", package.name(), unit.relative.display()),
                    package.name(),
                    TaskKind::Compile {
                        source: unit.path.clone(),
                        relative: unit.relative.clone(),
                    },
                    Vec::new(),
                    flags.clone(),
                    fingerprint,
                );
                objects.insert((package.name(), unit.relative.as_path()), id);
            }
        }

        // Link tasks in dependency order
        let mut linked: BTreeMap<&str, TaskId> = BTreeMap::new();
        for key in order {
            let node = &nodes[key];
            if node.inputs.is_empty() && node.decl.kind.is_library() {
                tracing::debug!("{} is header-only; no link task", key);
                continue;
            }

            let mut predecessors: Vec<TaskId> = node
                .inputs
                .iter()
                .filter_map(|unit| objects.get(&(node.package.name(), unit.relative.as_path())).copied())
                .collect();
            let object_count = predecessors.len();

            let edges: Vec<&str> = node.edges().map(String::as_str).collect();
            predecessors.extend(
                library_closure(&nodes, &edges)
                    .into_iter()
                    .filter_map(|library| linked.get(library).copied()),
            );
            let library_count = predecessors.len() - object_count;

            // Required binaries are only ordered before this target
            let mut seen: HashSet<TaskId> = HashSet::new();
            for edge in node.edges().filter(|edge| !nodes[edge.as_str()].decl.kind.is_library()) {
                if let Some(&id) = linked.get(edge.as_str()) {
                    if seen.insert(id) {
                        predecessors.push(id);
                    }
                }
            }

            let flags = link_flags(node.package, node.decl.kind, &closures[node.package.name()]);
            let predecessor_fps: Vec<Fingerprint> =
                predecessors.iter().map(|id| graph[*id].fingerprint).collect();
            let fingerprint = FingerprintBuilder::new("link")
                .text(node.decl.kind.as_str())
                .text(&node.decl.name)
                .flags(&flags)
                .predecessors(&predecessor_fps)
                .finish();

            let id = graph.push(
                format!("link:{}", key),
                node.package.name(),
                TaskKind::Link {
                    target: node.decl.name.clone(),
                    kind: node.decl.kind,
                    objects: object_count,
                    libraries: library_count,
                    test: false,
                },
                predecessors,
                flags,
                fingerprint,
            );
            linked.insert(key, id);
        }

        if let Some(root) = resolved.get(resolved.root()) {
            if !self.tests.is_empty() {
                let root = root.package.as_ref();
                self.plan_tests(&mut graph, root, &closures[root.name()], &nodes, &linked, &objects)?;
            }
        }

        tracing::info!(
            "Build graph: {} compile task(s), {} link task(s), {} test(s)",
            objects.len() + graph.tests.len(),
            linked.len(),
            graph.tests.len()
        );
        Ok(graph)
    }

    /// Compile each test unit and link it with every object of `root` except
    /// its entry points, plus the libraries of `root`'s dependencies
    fn plan_tests(
        &self,
        graph: &mut BuildGraph,
        root: &Package,
        deps: &[&Package],
        nodes: &BTreeMap<String, TargetNode<'_>>,
        linked: &BTreeMap<&str, TaskId>,
        objects: &BTreeMap<(&str, &Path), TaskId>,
    ) -> Result<(), GraphError> {
        let compile_flags = self.compile_flags(root, deps);
        let flags = link_flags(root, TargetKind::Binary, deps);
        let library_objects: Vec<TaskId> = objects
            .iter()
            .filter(|((package, relative), _)| *package == root.name() && !is_entry_point(relative))
            .map(|(_, id)| *id)
            .collect();
        let dep_libraries = dependency_library_keys(deps);
        let edges: Vec<&str> = dep_libraries.iter().map(String::as_str).collect();
        let libraries: Vec<TaskId> = library_closure(nodes, &edges)
            .into_iter()
            .filter_map(|library| linked.get(library).copied())
            .collect();

        for unit in &self.tests {
            let name = test_name(&unit.relative);
            let key = format!("test:{}:{}", root.name(), name);
            if graph.index.contains_key(&key) {
                return Err(GraphError::DuplicateTest { test: key });
            }

            let object = graph.push(
                format!("compile:{}:{}", root.name(), unit.relative.display()),
                root.name(),
                TaskKind::Compile {
                    source: unit.path.clone(),
                    relative: unit.relative.clone(),
                },
                Vec::new(),
                compile_flags.clone(),
                compile_fingerprint(unit, &compile_flags),
            );

            let mut predecessors = vec![object];
            predecessors.extend(library_objects.iter().copied());
            let object_count = predecessors.len();
            predecessors.extend(libraries.iter().copied());

            let predecessor_fps: Vec<Fingerprint> =
                predecessors.iter().map(|id| graph[*id].fingerprint).collect();
            let fingerprint = FingerprintBuilder::new("link")
                .text("test")
                .text(&name)
                .flags(&flags)
                .predecessors(&predecessor_fps)
                .finish();

            let id = graph.push(
                key,
                root.name(),
                TaskKind::Link {
                    target: name,
                    kind: TargetKind::Binary,
                    objects: object_count,
                    libraries: libraries.len(),
                    test: true,
                },
                predecessors,
                flags.clone(),
                fingerprint,
            );
            graph.tests.push(id);
        }
        Ok(())
    }

    /// Effective compile flags of every unit in `package`
    fn compile_flags(&self, package: &Package, deps: &[&Package]) -> Vec<String> {
        let mut flags = vec![format!("-std=c++{}", package.standard())];
        flags.extend(self.profile.compile_flags());
        if package.targets().iter().any(|t| t.kind == TargetKind::SharedLib) {
            flags.push("-fPIC".to_string());
        }

        for owner in std::iter::once(package).chain(deps.iter().copied()) {
            if let Some(root) = owner.root() {
                for dir in include_dirs(root, &owner.build().include_dirs) {
                    flags.push(format!("-I{}", dir.display()));
                }
            }
        }

        flags.extend(package.build().flags.iter().cloned());
        flags.extend(package.build().defines.iter().map(|d| format!("-D{}", d)));
        flags
    }
}

fn compile_fingerprint(unit: &SourceUnit, flags: &[String]) -> Fingerprint {
    unit.header_hashes()
        .fold(FingerprintBuilder::new("compile").digest(&unit.hash), |fp, header| {
            fp.digest(header)
        })
        .flags(flags)
        .finish()
}

/// `src/foo_test.cpp` runs as `foo_test`, `tests/bar.cpp` as `test_bar`
fn test_name(relative: &Path) -> String {
    let stem = relative
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    if relative.starts_with(TESTS_DIR) {
        format!("test_{}", stem)
    } else {
        stem
    }
}

/// Build the task graph with the default (dev) profile
pub fn build(resolved: &ResolvedSet, sources: &SourceIndex) -> Result<BuildGraph, GraphError> {
    GraphBuilder::new().build(resolved, sources)
}

fn link_flags(package: &Package, kind: TargetKind, deps: &[&Package]) -> Vec<String> {
    let mut flags = Vec::new();
    match kind {
        TargetKind::StaticLib => return flags,
        TargetKind::SharedLib => flags.push("-shared".to_string()),
        TargetKind::Binary => {}
    }

    let owners: Vec<&Package> = std::iter::once(package).chain(deps.iter().copied()).collect();
    for owner in &owners {
        for dir in &owner.build().lib_dirs {
            let dir = match owner.root() {
                Some(root) => root.join(dir),
                None => dir.clone(),
            };
            flags.push(format!("-L{}", dir.display()));
        }
    }
    for owner in &owners {
        flags.extend(owner.build().libs.iter().map(|lib| format!("-l{}", lib)));
    }
    flags
}

/// Keys of every library target declared by `deps`
fn dependency_library_keys(deps: &[&Package]) -> Vec<String> {
    deps.iter()
        .flat_map(|dep| {
            dep.targets()
                .into_iter()
                .filter(|t| t.kind.is_library())
                .map(|t| target_key(dep.name(), &t.name))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Library targets reachable from `edges` through other libraries
///
/// Each library comes before the libraries it depends on, the order a static
/// link line needs. Header-only libraries are listed too; they have no link
/// task, so callers drop them when mapping keys to tasks. Must only be called
/// on an acyclic node set.
fn library_closure<'n>(nodes: &'n BTreeMap<String, TargetNode<'_>>, edges: &[&'n str]) -> Vec<&'n str> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut finished: Vec<&str> = Vec::new();
    for &edge in edges.iter().rev() {
        visit_library(nodes, edge, &mut visited, &mut finished);
    }
    finished.reverse();
    finished
}

fn visit_library<'n>(
    nodes: &'n BTreeMap<String, TargetNode<'_>>,
    key: &'n str,
    visited: &mut HashSet<&'n str>,
    finished: &mut Vec<&'n str>,
) {
    let Some((key, node)) = nodes.get_key_value(key) else {
        return;
    };
    if !node.decl.kind.is_library() || !visited.insert(key.as_str()) {
        return;
    }
    for edge in node.edges().rev() {
        visit_library(nodes, edge, visited, finished);
    }
    finished.push(key.as_str());
}

fn plan_targets<'a>(
    resolved: &'a ResolvedSet,
    sources: &'a SourceIndex,
    closures: &BTreeMap<&str, Vec<&'a Package>>,
) -> Result<BTreeMap<String, TargetNode<'a>>, GraphError> {
    let mut nodes = BTreeMap::new();

    for entry in resolved.iter() {
        let package = entry.package.as_ref();
        let units = sources
            .get(package.name())
            .ok_or_else(|| GraphError::MissingSources {
                package: package.name().to_string(),
            })?;

        let dep_libraries = dependency_library_keys(&closures[package.name()]);

        for decl in package.targets() {
            let key = target_key(package.name(), &decl.name);
            let inputs: Vec<&SourceUnit> = units
                .iter()
                .filter(|unit| decl.includes_source(&unit.relative))
                .collect();

            let mut requires = Vec::new();
            for target_ref in &decl.requires {
                let owner = target_ref.package_or(package.name());
                let exists = resolved
                    .get(owner)
                    .is_some_and(|p| p.package.targets().iter().any(|t| t.name == target_ref.target));
                if !exists {
                    return Err(GraphError::UnknownTarget {
                        target: target_key(owner, &target_ref.target),
                        required_by: key,
                    });
                }
                requires.push(target_key(owner, &target_ref.target));
            }

            if inputs.is_empty() && requires.is_empty() && !decl.kind.is_library() {
                return Err(GraphError::EmptyTarget { target: key });
            }

            nodes.insert(
                key,
                TargetNode {
                    package,
                    decl,
                    inputs,
                    requires,
                    dep_libraries: dep_libraries.clone(),
                },
            );
        }
    }

    Ok(nodes)
}

/// First target-level cycle in key order, as a closed path
fn find_cycle(nodes: &BTreeMap<String, TargetNode<'_>>) -> Option<Vec<String>> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut path: Vec<&str> = Vec::new();

    for key in nodes.keys() {
        if let Some(cycle) = dfs_find_cycle(nodes, key, &mut visited, &mut on_stack, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn dfs_find_cycle<'a>(
    nodes: &'a BTreeMap<String, TargetNode<'_>>,
    key: &'a str,
    visited: &mut HashSet<&'a str>,
    on_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    if on_stack.contains(key) {
        let start = path.iter().position(|k| *k == key).unwrap_or(0);
        let mut cycle: Vec<String> = path[start..].iter().map(|k| k.to_string()).collect();
        cycle.push(key.to_string());
        return Some(cycle);
    }
    if !visited.insert(key) {
        return None;
    }

    on_stack.insert(key);
    path.push(key);
    if let Some(node) = nodes.get(key) {
        for edge in node.edges() {
            if let Some(cycle) = dfs_find_cycle(nodes, edge, visited, on_stack, path) {
                return Some(cycle);
            }
        }
    }
    on_stack.remove(key);
    path.pop();
    None
}

/// Kahn's algorithm over target nodes; ties broken by key
///
/// Must only be called on an acyclic node set.
fn topological_order<'a>(nodes: &'a BTreeMap<String, TargetNode<'_>>) -> Vec<&'a str> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (key, node) in nodes {
        let edges: BTreeSet<&str> = node.edges().map(String::as_str).collect();
        in_degree.insert(key.as_str(), edges.len());
        for edge in edges {
            dependents.entry(edge).or_default().push(key.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(key, _)| *key)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(key) = ready.pop_first() {
        order.push(key);
        for dependent in dependents.get(key).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use mule_package::{resolve, MemoryUniverse, TargetRef, VersionRange};
    use pretty_assertions::assert_eq;
    use semver::Version;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn unit(path: &str, content: &str) -> SourceUnit {
        SourceUnit::new(path, content.as_bytes())
    }

    fn fmt_lib() -> Package {
        Package::new("fmt", v("10.2.1")).with_kind(TargetKind::StaticLib)
    }

    fn app() -> Package {
        Package::new("app", v("1.0.0")).with_dependency("fmt", VersionRange::any())
    }

    fn index(entries: &[(&str, Vec<SourceUnit>)]) -> SourceIndex {
        entries
            .iter()
            .map(|(name, units)| (name.to_string(), units.clone()))
            .collect()
    }

    fn resolved(root: &Package, universe: &MemoryUniverse) -> ResolvedSet {
        resolve(root, universe).unwrap()
    }

    #[test]
    fn test_compile_then_link_layout() {
        let universe = MemoryUniverse::new().with(fmt_lib());
        let set = resolved(&app(), &universe);
        let sources = index(&[
            ("app", vec![unit("src/main.cpp", "int main() {}")]),
            ("fmt", vec![unit("src/format.cc", "x"), unit("src/os.cc", "y")]),
        ]);

        let graph = build(&set, &sources).unwrap();
        let keys: Vec<&str> = graph.tasks().iter().map(|t| t.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "compile:app:src/main.cpp",
                "compile:fmt:src/format.cc",
                "compile:fmt:src/os.cc",
                "link:fmt:fmt",
                "link:app:app",
            ]
        );

        let link = graph.by_key("link:app:app").unwrap();
        let preds: Vec<&str> = link.predecessors.iter().map(|id| graph[*id].key.as_str()).collect();
        assert_eq!(preds, vec!["compile:app:src/main.cpp", "link:fmt:fmt"]);
        assert_eq!(graph.dependents(graph.by_key("link:fmt:fmt").unwrap().id), &[link.id]);
    }

    #[test]
    fn test_predecessors_precede_tasks() {
        let universe = MemoryUniverse::new().with(fmt_lib());
        let set = resolved(&app(), &universe);
        let sources = index(&[("app", vec![unit("src/a.cpp", "a")]), ("fmt", vec![unit("src/f.cc", "f")])]);

        let graph = build(&set, &sources).unwrap();
        for task in graph.tasks() {
            assert!(task.predecessors.iter().all(|p| *p < task.id));
        }
    }

    #[test]
    fn test_compile_flags() {
        let set = resolved(
            &Package::new("solo", v("0.1.0")).with_standard("20").with_kind(TargetKind::SharedLib),
            &MemoryUniverse::new(),
        );
        let sources = index(&[("solo", vec![unit("src/lib.cpp", "")])]);

        let graph = GraphBuilder::new()
            .with_profile(ProfileConfig::from_profile(crate::Profile::Release))
            .build(&set, &sources)
            .unwrap();
        assert_eq!(graph.tasks()[0].flags, vec!["-std=c++20", "-O2", "-DNDEBUG", "-fPIC"]);
        assert_eq!(graph.tasks()[1].flags, vec!["-shared"]);
    }

    #[test]
    fn test_header_only_library_has_no_link_task() {
        let universe = MemoryUniverse::new().with(fmt_lib());
        let set = resolved(&app(), &universe);
        let sources = index(&[("app", vec![unit("src/main.cpp", "")]), ("fmt", vec![])]);

        let graph = build(&set, &sources).unwrap();
        assert!(graph.by_key("link:fmt:fmt").is_none());
        assert_eq!(graph.by_key("link:app:app").unwrap().predecessors.len(), 1);
    }

    #[test]
    fn test_empty_binary() {
        let set = resolved(&Package::new("app", v("1.0.0")), &MemoryUniverse::new());
        let err = build(&set, &index(&[("app", vec![])])).unwrap_err();
        assert_eq!(
            err,
            GraphError::EmptyTarget {
                target: "app:app".to_string()
            }
        );
    }

    #[test]
    fn test_missing_sources_entry() {
        let set = resolved(&Package::new("app", v("1.0.0")), &MemoryUniverse::new());
        assert_eq!(
            build(&set, &SourceIndex::new()).unwrap_err(),
            GraphError::MissingSources {
                package: "app".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_target() {
        let root = Package::new("app", v("1.0.0"))
            .with_target(TargetDecl::new("app", TargetKind::Binary).with_requires(vec![TargetRef::local("core")]));
        let set = resolved(&root, &MemoryUniverse::new());
        let err = build(&set, &index(&[("app", vec![unit("src/main.cpp", "")])])).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownTarget {
                target: "app:core".to_string(),
                required_by: "app:app".to_string(),
            }
        );
    }

    #[test]
    fn test_target_cycle() {
        let root = Package::new("app", v("1.0.0"))
            .with_target(
                TargetDecl::new("a", TargetKind::StaticLib)
                    .with_sources(vec![PathBuf::from("src/a")])
                    .with_requires(vec![TargetRef::local("b")]),
            )
            .with_target(
                TargetDecl::new("b", TargetKind::StaticLib)
                    .with_sources(vec![PathBuf::from("src/b")])
                    .with_requires(vec![TargetRef::local("a")]),
            );
        let set = resolved(&root, &MemoryUniverse::new());
        let sources = index(&[("app", vec![unit("src/a/a.cpp", ""), unit("src/b/b.cpp", "")])]);

        assert_eq!(
            build(&set, &sources).unwrap_err(),
            GraphError::Cycle {
                cycle: vec!["app:a".to_string(), "app:b".to_string(), "app:a".to_string()]
            }
        );
    }

    #[test]
    fn test_source_prefixes_split_inputs() {
        let root = Package::new("app", v("1.0.0"))
            .with_target(TargetDecl::new("core", TargetKind::StaticLib).with_sources(vec![PathBuf::from("src/core")]))
            .with_target(
                TargetDecl::new("tool", TargetKind::Binary)
                    .with_sources(vec![PathBuf::from("src/tool")])
                    .with_requires(vec![TargetRef::local("core")]),
            );
        let set = resolved(&root, &MemoryUniverse::new());
        let sources = index(&[(
            "app",
            vec![unit("src/core/a.cpp", "a"), unit("src/core/b.cpp", "b"), unit("src/tool/main.cpp", "m")],
        )]);

        let graph = build(&set, &sources).unwrap();
        let tool = graph.by_key("link:app:tool").unwrap();
        let inputs: Vec<usize> = tool.predecessors.iter().map(|id| id.index()).collect();
        let (objects, libraries) = tool.split_inputs(&inputs);
        assert_eq!(objects.len(), 1);
        assert_eq!(libraries, &[graph.by_key("link:app:core").unwrap().id.index()]);
    }

    fn link_libraries<'g>(graph: &'g BuildGraph, key: &str) -> Vec<&'g str> {
        let task = graph.by_key(key).unwrap();
        let (_, libraries) = task.split_inputs(&task.predecessors);
        libraries.iter().map(|id| graph[*id].key.as_str()).collect()
    }

    #[test]
    fn test_required_libraries_are_linked_transitively() {
        let root = Package::new("app", v("1.0.0"))
            .with_target(TargetDecl::new("util", TargetKind::StaticLib).with_sources(vec![PathBuf::from("src/util")]))
            .with_target(
                TargetDecl::new("core", TargetKind::StaticLib)
                    .with_sources(vec![PathBuf::from("src/core")])
                    .with_requires(vec![TargetRef::local("util")]),
            )
            .with_target(
                TargetDecl::new("tool", TargetKind::Binary)
                    .with_sources(vec![PathBuf::from("src/tool")])
                    .with_requires(vec![TargetRef::local("core")]),
            );
        let set = resolved(&root, &MemoryUniverse::new());
        let sources = index(&[(
            "app",
            vec![unit("src/core/c.cpp", "c"), unit("src/tool/main.cpp", "m"), unit("src/util/u.cpp", "u")],
        )]);

        let graph = build(&set, &sources).unwrap();
        assert_eq!(link_libraries(&graph, "link:app:tool"), vec!["link:app:core", "link:app:util"]);
    }

    #[test]
    fn test_header_only_library_passes_on_its_requirements() {
        let root = Package::new("app", v("1.0.0"))
            .with_target(TargetDecl::new("util", TargetKind::StaticLib).with_sources(vec![PathBuf::from("src/util")]))
            .with_target(
                TargetDecl::new("headers", TargetKind::StaticLib)
                    .with_sources(vec![PathBuf::from("src/headers")])
                    .with_requires(vec![TargetRef::local("util")]),
            )
            .with_target(
                TargetDecl::new("app", TargetKind::Binary)
                    .with_sources(vec![PathBuf::from("src/app")])
                    .with_requires(vec![TargetRef::local("headers")]),
            );
        let set = resolved(&root, &MemoryUniverse::new());
        let sources = index(&[("app", vec![unit("src/app/main.cpp", "m"), unit("src/util/u.cpp", "u")])]);

        let graph = build(&set, &sources).unwrap();
        assert!(graph.by_key("link:app:headers").is_none());
        assert_eq!(link_libraries(&graph, "link:app:app"), vec!["link:app:util"]);
    }

    #[test]
    fn test_tests_link_library_objects_without_main() {
        let universe = MemoryUniverse::new().with(fmt_lib());
        let set = resolved(&app(), &universe);
        let sources = index(&[
            ("app", vec![unit("src/main.cpp", "m"), unit("src/parser.cpp", "p")]),
            ("fmt", vec![unit("src/format.cc", "f")]),
        ]);

        let graph = GraphBuilder::new()
            .with_tests(vec![unit("src/parser_test.cpp", "t"), unit("tests/cli.cpp", "c")])
            .build(&set, &sources)
            .unwrap();

        let tests: Vec<&str> = graph.tests().iter().map(|id| graph[*id].key.as_str()).collect();
        assert_eq!(tests, vec!["test:app:parser_test", "test:app:test_cli"]);
        assert_eq!(graph.len(), 9);

        let test = graph.by_key("test:app:parser_test").unwrap();
        assert!(test.is_test());
        let preds: Vec<&str> = test.predecessors.iter().map(|id| graph[*id].key.as_str()).collect();
        assert_eq!(
            preds,
            vec!["compile:app:src/parser_test.cpp", "compile:app:src/parser.cpp", "link:fmt:fmt"]
        );
        assert_eq!(link_libraries(&graph, "test:app:test_cli"), vec!["link:fmt:fmt"]);
        assert!(!graph.by_key("link:app:app").unwrap().is_test());
        for task in graph.tasks() {
            assert!(task.predecessors.iter().all(|p| *p < task.id));
        }
    }

    #[test]
    fn test_plain_build_has_no_tests() {
        let set = resolved(&Package::new("app", v("1.0.0")), &MemoryUniverse::new());
        let graph = build(&set, &index(&[("app", vec![unit("src/main.cpp", "")])])).unwrap();
        assert!(graph.tests().is_empty());
    }

    #[test]
    fn test_duplicate_test_names() {
        let set = resolved(&Package::new("app", v("1.0.0")), &MemoryUniverse::new());
        let err = GraphBuilder::new()
            .with_tests(vec![unit("src/a/x_test.cpp", "a"), unit("src/b/x_test.cpp", "b")])
            .build(&set, &index(&[("app", vec![unit("src/main.cpp", "")])]))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateTest {
                test: "test:app:x_test".to_string()
            }
        );
    }

    #[test]
    fn test_fingerprint_tracks_sources_and_flags() {
        let set = resolved(&Package::new("app", v("1.0.0")), &MemoryUniverse::new());
        let first = build(&set, &index(&[("app", vec![unit("src/main.cpp", "v1")])])).unwrap();
        let again = build(&set, &index(&[("app", vec![unit("src/main.cpp", "v1")])])).unwrap();
        let edited = build(&set, &index(&[("app", vec![unit("src/main.cpp", "v2")])])).unwrap();
        let release = GraphBuilder::new()
            .with_profile(ProfileConfig::from_profile(crate::Profile::Release))
            .build(&set, &index(&[("app", vec![unit("src/main.cpp", "v1")])]))
            .unwrap();

        let fps = |g: &BuildGraph| g.tasks().iter().map(|t| t.fingerprint).collect::<Vec<_>>();
        assert_eq!(fps(&first), fps(&again));
        assert_ne!(fps(&first)[0], fps(&edited)[0]);
        // the link task sees the changed object through its predecessor
        assert_ne!(fps(&first)[1], fps(&edited)[1]);
        assert_ne!(fps(&first)[0], fps(&release)[0]);
    }
}
