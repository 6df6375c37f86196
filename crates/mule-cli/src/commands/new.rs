//! New command - scaffold a project directory

use anyhow::{bail, Context, Result};
use mule_package::{TargetKind, Validator, MANIFEST_FILE};
use std::fs;
use std::path::Path;

/// Arguments for the new command
#[derive(Debug, Clone)]
pub struct NewArgs {
    pub name: String,
    /// Static library instead of a program
    pub lib: bool,
}

/// Run the new command, creating `<parent>/<name>`
pub fn run(parent: &Path, args: NewArgs) -> Result<()> {
    Validator::validate_package_name(&args.name).map_err(|e| anyhow::anyhow!("{}", e))?;

    let path = parent.join(&args.name);
    if path.exists() {
        bail!("destination {} already exists", path.display());
    }

    let kind = if args.lib { TargetKind::StaticLib } else { TargetKind::Binary };
    create_project(&path, &args.name, kind)?;

    let what = if args.lib { "library" } else { "binary (application)" };
    println!("Created {} package '{}' in {}", what, args.name, path.display());
    Ok(())
}

fn create_project(path: &Path, name: &str, kind: TargetKind) -> Result<()> {
    let ident = identifier(name);
    let mut files = vec![
        (MANIFEST_FILE.to_string(), generate_manifest(name, kind)),
        (".gitignore".to_string(), "/target\n".to_string()),
    ];
    match kind {
        TargetKind::Binary => files.push(("src/main.cpp".to_string(), generate_main(name))),
        TargetKind::StaticLib | TargetKind::SharedLib => {
            files.push((format!("include/{}/{}.h", name, name), generate_header(&ident)));
            files.push((format!("src/{}.cpp", name), generate_source(name, &ident)));
            files.push((format!("src/{}_test.cpp", name), generate_test(name, &ident)));
        }
    }

    for (relative, content) in files {
        let file = path.join(&relative);
        if let Some(dir) = file.parent() {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        fs::write(&file, content).with_context(|| format!("Failed to write {}", file.display()))?;
        tracing::debug!("Created {}", file.display());
    }
    Ok(())
}

/// Package names may contain `-`; C++ namespaces may not
fn identifier(name: &str) -> String {
    let ident = name.replace('-', "_");
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", ident)
    } else {
        ident
    }
}

fn generate_manifest(name: &str, kind: TargetKind) -> String {
    let mut manifest = format!(
        r#"[package]
name = "{name}"
version = "0.1.0"
standard = "17"
"#
    );
    if kind != TargetKind::Binary {
        manifest.push_str(&format!("type = \"{}\"\n", kind));
    }
    manifest.push_str("\n[dependencies]\n");
    manifest
}

fn generate_main(name: &str) -> String {
    format!(
        r#"#include <iostream>

int main() {{
    std::cout << "Hello from {name}!" << std::endl;
    return 0;
}}
"#
    )
}

fn generate_header(ident: &str) -> String {
    format!(
        r#"#pragma once

namespace {ident} {{

int answer();

}}
"#
    )
}

fn generate_source(name: &str, ident: &str) -> String {
    format!(
        r#"#include "{name}/{name}.h"

namespace {ident} {{

int answer() {{
    return 42;
}}

}}
"#
    )
}

fn generate_test(name: &str, ident: &str) -> String {
    format!(
        r#"#include "{name}/{name}.h"

#include <iostream>

int main() {{
    if ({ident}::answer() != 42) {{
        std::cerr << "answer() returned " << {ident}::answer() << std::endl;
        return 1;
    }}
    return 0;
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mule_package::PackageManifest;
    use tempfile::TempDir;

    #[test]
    fn test_binary_layout() {
        let temp = TempDir::new().unwrap();
        run(
            temp.path(),
            NewArgs {
                name: "hello".to_string(),
                lib: false,
            },
        )
        .unwrap();

        let root = temp.path().join("hello");
        assert!(root.join("src/main.cpp").exists());
        assert!(!root.join("include").exists());
        let manifest = PackageManifest::from_file(&root.join(MANIFEST_FILE)).unwrap();
        let package = manifest.into_package(Some(&root)).unwrap();
        assert_eq!(package.name(), "hello");
        assert_eq!(package.kind(), TargetKind::Binary);
        assert_eq!(package.standard(), "17");
    }

    #[test]
    fn test_library_layout() {
        let temp = TempDir::new().unwrap();
        run(
            temp.path(),
            NewArgs {
                name: "tiny-json".to_string(),
                lib: true,
            },
        )
        .unwrap();

        let root = temp.path().join("tiny-json");
        assert!(root.join("include/tiny-json/tiny-json.h").exists());
        assert!(root.join("src/tiny-json_test.cpp").exists());
        let source = fs::read_to_string(root.join("src/tiny-json.cpp")).unwrap();
        assert!(source.contains("namespace tiny_json {"));
        let manifest = PackageManifest::from_file(&root.join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest.into_package(Some(&root)).unwrap().kind(), TargetKind::StaticLib);
    }

    #[test]
    fn test_existing_destination() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("taken")).unwrap();
        let err = run(
            temp.path(),
            NewArgs {
                name: "taken".to_string(),
                lib: false,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_invalid_name() {
        let temp = TempDir::new().unwrap();
        let args = NewArgs {
            name: "Bad Name".to_string(),
            lib: false,
        };
        assert!(run(temp.path(), args).is_err());
    }
}
