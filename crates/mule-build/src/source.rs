//! Source discovery and include scanning
//!
//! Files under `src/` whose stem ends in `_test` are unit tests and files
//! directly under `tests/` are integration tests. Neither is compiled into
//! the package's own targets.

use crate::error::{BuildError, BuildResult};
use crate::fingerprint::Fingerprint;
use mule_package::{Package, ResolvedSet};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Translation-unit extensions picked up under `src/`
pub const SOURCE_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "c"];

/// Default include directory of every package, relative to its root
pub const DEFAULT_INCLUDE_DIR: &str = "include";

/// Integration test directory, relative to the package root
pub const TESTS_DIR: &str = "tests";

const UNIT_TEST_SUFFIX: &str = "_test";

/// Sources of each resolved package, keyed by package name
pub type SourceIndex = BTreeMap<String, Vec<SourceUnit>>;

/// A header a source unit includes, directly or through other headers
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HeaderDep {
    pub path: PathBuf,
    pub hash: Fingerprint,
}

/// One translation unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Path relative to the package root; used in task keys and target matching
    pub relative: PathBuf,
    /// Path handed to the compiler
    pub path: PathBuf,
    pub hash: Fingerprint,
    /// Sorted by path
    pub headers: Vec<HeaderDep>,
}

impl SourceUnit {
    /// In-memory unit with no headers; `path` doubles as the relative path
    pub fn new(path: impl Into<PathBuf>, content: &[u8]) -> Self {
        let path = path.into();
        Self {
            relative: path.clone(),
            path,
            hash: Fingerprint::of(content),
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, mut headers: Vec<HeaderDep>) -> Self {
        headers.sort();
        self.headers = headers;
        self
    }

    /// Read `relative` under `package_root` and collect the headers it includes
    ///
    /// Only quoted includes are followed. A header is looked up next to the
    /// including file first, then in each include directory in order; headers
    /// that resolve nowhere are assumed to be system headers and ignored.
    pub fn load(package_root: &Path, relative: &Path, include_dirs: &[PathBuf]) -> BuildResult<Self> {
        let path = package_root.join(relative);
        let content = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BuildError::SourceNotFound { path: path.clone() }
            } else {
                BuildError::io(&path, e)
            }
        })?;

        let headers = scan_headers(&path, &content, include_dirs)?;
        Ok(Self {
            relative: relative.to_path_buf(),
            hash: Fingerprint::of(&content),
            path,
            headers,
        })
    }

    /// Fingerprints of every included header, in path order
    pub fn header_hashes(&self) -> impl Iterator<Item = &Fingerprint> {
        self.headers.iter().map(|h| &h.hash)
    }
}

/// Targets of `#include "..."` directives in `content`
pub fn quoted_includes(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let rest = line.trim_start().strip_prefix('#')?.trim_start();
            let rest = rest.strip_prefix("include")?.trim_start();
            let rest = rest.strip_prefix('"')?;
            let end = rest.find('"')?;
            Some(rest[..end].to_string())
        })
        .collect()
}

fn resolve_include(name: &str, including: &Path, include_dirs: &[PathBuf]) -> Option<PathBuf> {
    let local = including.parent().map(|dir| dir.join(name));
    local
        .into_iter()
        .chain(include_dirs.iter().map(|dir| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// Transitive quoted-include closure of one file
fn scan_headers(path: &Path, content: &[u8], include_dirs: &[PathBuf]) -> BuildResult<Vec<HeaderDep>> {
    let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
    let mut headers = Vec::new();
    let mut queue: VecDeque<(PathBuf, Vec<u8>)> = VecDeque::new();
    queue.push_back((path.to_path_buf(), content.to_vec()));

    while let Some((file, bytes)) = queue.pop_front() {
        let text = String::from_utf8_lossy(&bytes);
        for name in quoted_includes(&text) {
            let Some(header) = resolve_include(&name, &file, include_dirs) else {
                tracing::trace!("Unresolved include \"{}\" in {}", name, file.display());
                continue;
            };
            if !seen.insert(header.clone()) {
                continue;
            }
            let header_bytes = fs::read(&header).map_err(|e| BuildError::io(&header, e))?;
            headers.push(HeaderDep {
                path: header.clone(),
                hash: Fingerprint::of(&header_bytes),
            });
            queue.push_back((header, header_bytes));
        }
    }

    headers.sort();
    Ok(headers)
}

/// Include directories of a package: `include/` first, then `[build] include_dirs`
pub fn include_dirs(package_root: &Path, configured: &[PathBuf]) -> Vec<PathBuf> {
    std::iter::once(PathBuf::from(DEFAULT_INCLUDE_DIR))
        .chain(configured.iter().cloned())
        .map(|dir| package_root.join(dir))
        .collect()
}

fn file_stem(relative: &Path) -> &str {
    relative.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default()
}

/// `src/**/<name>_test.<ext>`
pub fn is_unit_test(relative: &Path) -> bool {
    file_stem(relative).ends_with(UNIT_TEST_SUFFIX)
}

/// Files named `main` hold a program entry point and stay out of test binaries
pub fn is_entry_point(relative: &Path) -> bool {
    file_stem(relative) == "main"
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Source files under `<package_root>/<dir>`, relative to the root and sorted
fn walk_sources(package_root: &Path, dir: &str, max_depth: usize) -> BuildResult<Vec<PathBuf>> {
    let dir = package_root.join(dir);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut relative_paths = Vec::new();
    for entry in WalkDir::new(&dir)
        .follow_links(false)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|e| BuildError::Io(e.into()))?;
        if !entry.file_type().is_file() || !has_source_extension(entry.path()) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(package_root) {
            relative_paths.push(relative.to_path_buf());
        }
    }
    relative_paths.sort();
    Ok(relative_paths)
}

fn load_all(package_root: &Path, relative_paths: &[PathBuf], include_dirs: &[PathBuf]) -> BuildResult<Vec<SourceUnit>> {
    relative_paths
        .iter()
        .map(|relative| SourceUnit::load(package_root, relative, include_dirs))
        .collect()
}

/// Discover every translation unit under `<package_root>/src`, sorted by path
///
/// Unit tests are left out; see [`discover_tests`].
pub fn discover_sources(package_root: &Path, include_dirs: &[PathBuf]) -> BuildResult<Vec<SourceUnit>> {
    let mut relative_paths = walk_sources(package_root, "src", usize::MAX)?;
    relative_paths.retain(|relative| !is_unit_test(relative));
    load_all(package_root, &relative_paths, include_dirs)
}

/// Unit tests under `src/` followed by integration tests directly under `tests/`
pub fn discover_tests(package_root: &Path, include_dirs: &[PathBuf]) -> BuildResult<Vec<SourceUnit>> {
    let mut relative_paths = walk_sources(package_root, "src", usize::MAX)?;
    relative_paths.retain(|relative| is_unit_test(relative));
    relative_paths.extend(walk_sources(package_root, TESTS_DIR, 1)?);
    load_all(package_root, &relative_paths, include_dirs)
}

/// Include directories searched for `package`: its own, then its dependencies'
fn search_dirs(resolved: &ResolvedSet, package: &Package, root: &Path) -> Vec<PathBuf> {
    let mut dirs = include_dirs(root, &package.build().include_dirs);
    for dep in resolved.transitive_dependencies(package.name()) {
        if let Some(dep_root) = dep.package.root() {
            dirs.extend(include_dirs(dep_root, &dep.package.build().include_dirs));
        }
    }
    dirs
}

/// Discover sources for every resolved package that has a root directory
///
/// Headers are looked up in the package's own include directories, then in
/// those of its dependencies. Packages without a root (in-memory packages) get
/// an empty entry.
pub fn index_sources(resolved: &ResolvedSet) -> BuildResult<SourceIndex> {
    let mut index = SourceIndex::new();
    for entry in resolved.iter() {
        let package = &entry.package;
        let units = match package.root() {
            Some(root) => discover_sources(root, &search_dirs(resolved, package, root))?,
            None => Vec::new(),
        };
        tracing::debug!("{}: {} source file(s)", package.id(), units.len());
        index.insert(package.name().to_string(), units);
    }
    Ok(index)
}

/// Test sources of the root package; empty when it has no root directory
pub fn index_tests(resolved: &ResolvedSet) -> BuildResult<Vec<SourceUnit>> {
    let Some(entry) = resolved.get(resolved.root()) else {
        return Ok(Vec::new());
    };
    let package = &entry.package;
    let Some(root) = package.root() else {
        return Ok(Vec::new());
    };
    let units = discover_tests(root, &search_dirs(resolved, package, root))?;
    tracing::debug!("{}: {} test source(s)", package.id(), units.len());
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_quoted_includes() {
        let src = "#include \"a.h\"\n  #  include \"dir/b.hpp\" // note\n#include <vector>\nint x;\n";
        assert_eq!(quoted_includes(src), vec!["a.h", "dir/b.hpp"]);
    }

    #[test]
    fn test_transitive_headers() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "src/main.cpp", "#include \"util.h\"\n#include \"local.h\"\n");
        write(root, "src/local.h", "#pragma once\n");
        write(root, "include/util.h", "#include \"detail.h\"\n");
        write(root, "include/detail.h", "#include \"util.h\"\n");

        let dirs = include_dirs(root, &[]);
        let unit = SourceUnit::load(root, Path::new("src/main.cpp"), &dirs).unwrap();
        let names: Vec<String> = unit
            .headers
            .iter()
            .map(|h| h.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["detail.h", "util.h", "local.h"]);
    }

    #[test]
    fn test_header_change_changes_hash() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "src/main.cpp", "#include \"config.h\"\n");
        write(root, "include/config.h", "#define LEVEL 1\n");

        let dirs = include_dirs(root, &[]);
        let before = SourceUnit::load(root, Path::new("src/main.cpp"), &dirs).unwrap();
        write(root, "include/config.h", "#define LEVEL 2\n");
        let after = SourceUnit::load(root, Path::new("src/main.cpp"), &dirs).unwrap();

        assert_eq!(before.hash, after.hash);
        assert_ne!(before.headers, after.headers);
    }

    #[test]
    fn test_discover_sources() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "src/b.cpp", "");
        write(root, "src/a/x.cc", "");
        write(root, "src/readme.md", "");
        write(root, "src/c.c", "");

        let units = discover_sources(root, &[]).unwrap();
        let paths: Vec<PathBuf> = units.into_iter().map(|u| u.relative).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("src/a/x.cc"),
                PathBuf::from("src/b.cpp"),
                PathBuf::from("src/c.c"),
            ]
        );
    }

    #[test]
    fn test_tests_are_kept_out_of_sources() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "src/main.cpp", "");
        write(root, "src/parser.cpp", "");
        write(root, "src/parser_test.cpp", "");
        write(root, "src/nested/lexer_test.cc", "");
        write(root, "tests/cli.cpp", "");
        write(root, "tests/fixtures/helper.cpp", "");

        let sources: Vec<PathBuf> = discover_sources(root, &[]).unwrap().into_iter().map(|u| u.relative).collect();
        assert_eq!(sources, vec![PathBuf::from("src/main.cpp"), PathBuf::from("src/parser.cpp")]);

        let tests: Vec<PathBuf> = discover_tests(root, &[]).unwrap().into_iter().map(|u| u.relative).collect();
        assert_eq!(
            tests,
            vec![
                PathBuf::from("src/nested/lexer_test.cc"),
                PathBuf::from("src/parser_test.cpp"),
                PathBuf::from("tests/cli.cpp"),
            ]
        );
    }

    #[test]
    fn test_entry_points() {
        assert!(is_entry_point(Path::new("src/main.cpp")));
        assert!(is_entry_point(Path::new("src/tool/main.cc")));
        assert!(!is_entry_point(Path::new("src/domain.cpp")));
    }

    #[test]
    fn test_missing_src_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(discover_sources(temp.path(), &[]).unwrap().is_empty());
    }
}
