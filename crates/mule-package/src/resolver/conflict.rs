//! Conflict reporting for dependency resolution

use crate::version::VersionRange;
use semver::Version;
use std::fmt;

/// Conflict information for reporting
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub package: String,
    /// Version already selected when a later constraint excluded it
    pub selected: Option<Version>,
    pub constraints: Vec<ConflictingConstraint>,
}

/// A single conflicting constraint
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictingConstraint {
    pub range: VersionRange,
    /// Package that imposed this constraint (`name@version`)
    pub source: String,
    /// Requirement chain from the root down to `source`
    pub path: Vec<String>,
}

impl Conflict {
    pub fn new(package: impl Into<String>, constraints: Vec<ConflictingConstraint>) -> Self {
        Self {
            package: package.into(),
            selected: None,
            constraints,
        }
    }

    pub fn with_selected(mut self, version: Version) -> Self {
        self.selected = Some(version);
        self
    }

    /// Generate human-readable conflict report
    pub fn report(&self) -> String {
        let mut report = format!("Version conflict for package '{}':\n", self.package);

        if let Some(selected) = &self.selected {
            report.push_str(&format!("  selected {}@{}\n", self.package, selected));
        }

        for constraint in &self.constraints {
            report.push_str(&format!(
                "  {} requires {}",
                constraint.source, constraint.range
            ));
            if constraint.path.len() > 1 {
                report.push_str(&format!(" (via {})", constraint.path.join(" -> ")));
            }
            report.push('\n');
        }

        report.push_str("\nPossible solutions:\n");
        report.push_str("  1. Relax one of the version ranges above\n");
        report.push_str("  2. Publish or add a version that satisfies every range\n");

        report
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Sources of the conflicting constraints
    pub fn sources(&self) -> Vec<&str> {
        self.constraints.iter().map(|c| c.source.as_str()).collect()
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version conflict for package '{}': ", self.package)?;
        if let Some(selected) = &self.selected {
            write!(f, "selected {}, ", selected)?;
        }
        let parts: Vec<String> = self
            .constraints
            .iter()
            .map(|c| format!("{} requires {}", c.source, c.range))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl ConflictingConstraint {
    pub fn new(range: VersionRange, source: impl Into<String>, path: Vec<String>) -> Self {
        Self {
            range,
            source: source.into(),
            path,
        }
    }
}

/// Indices of a smallest subset of `ranges` whose intersection is empty
///
/// Ranges are intervals, so an empty intersection always contains either an
/// empty range or a disjoint pair. When the full intersection is not empty
/// there is nothing smaller to blame and every index is returned.
pub fn minimal_conflicting_set(ranges: &[VersionRange]) -> Vec<usize> {
    if !VersionRange::intersect_all(ranges).is_empty() {
        return (0..ranges.len()).collect();
    }

    if let Some(i) = ranges.iter().position(VersionRange::is_empty) {
        return vec![i];
    }

    for i in 0..ranges.len() {
        for j in (i + 1)..ranges.len() {
            if ranges[i].is_disjoint(&ranges[j]) {
                return vec![i, j];
            }
        }
    }

    (0..ranges.len()).collect()
}
