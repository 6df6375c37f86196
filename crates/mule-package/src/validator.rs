//! Package manifest validation

use crate::manifest::{Dependency, DetailedDependency, PackageManifest, TargetDecl};
use std::collections::{BTreeMap, HashSet};

/// C++ standards accepted in `package.standard`
const KNOWN_STANDARDS: &[&str] = &["98", "03", "11", "14", "17", "20", "23", "26"];

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid package name format
    InvalidPackageName(String),
    /// Unknown C++ standard
    InvalidStandard(String),
    /// Invalid dependency specification
    InvalidDependency { name: String, reason: String },
    /// Conflicting dependency sources
    ConflictingSource { name: String, reason: String },
    /// Invalid target declaration
    InvalidTarget { name: String, reason: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidPackageName(name) => {
                write!(f, "Invalid package name: {}", name)
            }
            ValidationError::InvalidStandard(standard) => {
                write!(f, "Unknown C++ standard: {}", standard)
            }
            ValidationError::InvalidDependency { name, reason } => {
                write!(f, "Invalid dependency '{}': {}", name, reason)
            }
            ValidationError::ConflictingSource { name, reason } => {
                write!(f, "Conflicting source for '{}': {}", name, reason)
            }
            ValidationError::InvalidTarget { name, reason } => {
                write!(f, "Invalid target '{}': {}", name, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Package manifest validator
pub struct Validator;

impl Validator {
    /// Validate package manifest, collecting every problem found
    pub fn validate(manifest: &PackageManifest) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_package_name(&manifest.package.name) {
            errors.push(e);
        }

        if !KNOWN_STANDARDS.contains(&manifest.package.standard.as_str()) {
            errors.push(ValidationError::InvalidStandard(
                manifest.package.standard.clone(),
            ));
        }

        errors.extend(Self::validate_dependencies(
            &manifest.package.name,
            &manifest.dependencies,
        ));
        errors.extend(Self::validate_targets(
            &manifest.targets,
            &manifest.dependencies,
        ));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate package name format
    pub fn validate_package_name(name: &str) -> Result<(), ValidationError> {
        let Some(first) = name.chars().next() else {
            return Err(ValidationError::InvalidPackageName(
                "Package name cannot be empty".to_string(),
            ));
        };

        // Package names must start with lowercase letter or digit
        if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
            return Err(ValidationError::InvalidPackageName(format!(
                "'{}' must start with lowercase letter or digit",
                name
            )));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidPackageName(format!(
                "'{}' contains invalid characters (only lowercase, digits, -, _ allowed)",
                name
            )));
        }

        if name.ends_with('-') || name.ends_with('_') {
            return Err(ValidationError::InvalidPackageName(format!(
                "'{}' cannot end with - or _",
                name
            )));
        }

        if name.len() > 64 {
            return Err(ValidationError::InvalidPackageName(format!(
                "'{}' exceeds maximum length of 64 characters",
                name
            )));
        }

        Ok(())
    }

    fn validate_dependencies(
        package: &str,
        deps: &BTreeMap<String, Dependency>,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (name, dep) in deps {
            if let Err(e) = Self::validate_package_name(name) {
                errors.push(ValidationError::InvalidDependency {
                    name: name.clone(),
                    reason: e.to_string(),
                });
            }

            if name == package {
                errors.push(ValidationError::InvalidDependency {
                    name: name.clone(),
                    reason: "package cannot depend on itself".to_string(),
                });
            }

            if let Dependency::Detailed(detailed) = dep {
                errors.extend(Self::validate_detailed_dependency(name, detailed));
            }
        }

        errors
    }

    fn validate_detailed_dependency(name: &str, dep: &DetailedDependency) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if dep.git.is_some() && dep.path.is_some() {
            errors.push(ValidationError::ConflictingSource {
                name: name.to_string(),
                reason: "Cannot specify both git and path".to_string(),
            });
        }

        if dep.tag.is_some() && dep.commit.is_some() {
            errors.push(ValidationError::InvalidDependency {
                name: name.to_string(),
                reason: "Git dependency cannot specify both tag and commit".to_string(),
            });
        }

        if dep.git.is_none() && (dep.tag.is_some() || dep.commit.is_some()) {
            errors.push(ValidationError::InvalidDependency {
                name: name.to_string(),
                reason: "tag/commit requires git source".to_string(),
            });
        }

        errors
    }

    fn validate_targets(
        targets: &[TargetDecl],
        deps: &BTreeMap<String, Dependency>,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for target in targets {
            if let Err(e) = Self::validate_package_name(&target.name) {
                errors.push(ValidationError::InvalidTarget {
                    name: target.name.clone(),
                    reason: e.to_string(),
                });
            }
            if !seen.insert(target.name.as_str()) {
                errors.push(ValidationError::InvalidTarget {
                    name: target.name.clone(),
                    reason: "declared more than once".to_string(),
                });
            }
        }

        for target in targets {
            for req in &target.requires {
                match &req.package {
                    None if !seen.contains(req.target.as_str()) => {
                        errors.push(ValidationError::InvalidTarget {
                            name: target.name.clone(),
                            reason: format!("requires unknown local target '{}'", req.target),
                        });
                    }
                    Some(pkg) if !deps.contains_key(pkg) => {
                        errors.push(ValidationError::InvalidTarget {
                            name: target.name.clone(),
                            reason: format!("requires '{}' from undeclared dependency", req),
                        });
                    }
                    _ => {}
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn manifest(toml: &str) -> PackageManifest {
        PackageManifest::from_str(toml).unwrap()
    }

    #[rstest]
    #[case("fmt", true)]
    #[case("my-pkg_2", true)]
    #[case("2d", true)]
    #[case("", false)]
    #[case("Fmt", false)]
    #[case("-fmt", false)]
    #[case("fmt-", false)]
    #[case("f.mt", false)]
    fn test_package_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(Validator::validate_package_name(name).is_ok(), valid);
    }

    #[test]
    fn test_valid_manifest() {
        let m = manifest(
            r#"
            [package]
            name = "app"
            version = "1.0.0"

            [dependencies]
            fmt = "^10"

            [[target]]
            name = "core"
            type = "static-lib"

            [[target]]
            name = "app"
            requires = ["core", "fmt:fmt"]
        "#,
        );
        assert!(Validator::validate(&m).is_ok());
    }

    #[test]
    fn test_self_dependency() {
        let m = manifest(
            r#"
            [package]
            name = "app"
            version = "1.0.0"

            [dependencies]
            app = "1"
        "#,
        );
        let errors = Validator::validate(&m).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidDependency { .. }));
    }

    #[test]
    fn test_conflicting_sources() {
        let m = manifest(
            r#"
            [package]
            name = "app"
            version = "1.0.0"

            [dependencies]
            json = { git = "https://example.com/json.git", path = "../json", tag = "v1", commit = "abc" }
        "#,
        );
        let errors = Validator::validate(&m).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_unknown_standard() {
        let m = manifest(
            r#"
            [package]
            name = "app"
            version = "1.0.0"
            standard = "19"
        "#,
        );
        let errors = Validator::validate(&m).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidStandard("19".to_string())]);
    }

    #[test]
    fn test_target_requirements() {
        let m = manifest(
            r#"
            [package]
            name = "app"
            version = "1.0.0"

            [[target]]
            name = "app"
            requires = ["missing", "zlib:z"]

            [[target]]
            name = "app"
        "#,
        );
        let errors = Validator::validate(&m).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
