use mule_package::lockfile::LOCKFILE_NAME;
use mule_package::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn registry_package(registry: &Path, name: &str, version: &str, deps: &str) {
    write(
        &registry.join(name).join(version).join("mule.toml"),
        &format!(
            "[package]\nname = \"{name}\"\nversion = \"{version}\"\ntype = \"static-lib\"\n\n[dependencies]\n{deps}"
        ),
    );
}

#[test]
fn test_manifest_to_lockfile() {
    let temp = TempDir::new().unwrap();
    let registry = temp.path().join("registry");
    registry_package(&registry, "fmt", "9.1.0", "");
    registry_package(&registry, "fmt", "10.2.1", "");
    registry_package(&registry, "spdlog", "1.12.0", "fmt = \">=9, <11\"\n");

    let project = temp.path().join("app");
    write(
        &project.join("mule.toml"),
        r#"
        [package]
        name = "app"
        version = "0.3.0"
        standard = "20"

        [dependencies]
        spdlog = "^1.10"

        [build]
        flags = ["-Wall"]
    "#,
    );

    let root = load_package(&project.join("mule.toml")).unwrap();
    assert_eq!(root.standard(), "20");
    assert_eq!(root.root(), Some(project.as_path()));

    let resolved = resolve(&root, &DirectoryRegistry::new(&registry)).unwrap();
    assert_eq!(resolved.version("fmt").unwrap().to_string(), "10.2.1");
    assert_eq!(
        resolved.get("spdlog").unwrap().package.kind(),
        TargetKind::StaticLib
    );

    let lock_path = project.join(LOCKFILE_NAME);
    Lockfile::from_resolved(&resolved)
        .write_to_file(&lock_path)
        .unwrap();

    let lockfile = Lockfile::from_file(&lock_path).unwrap();
    assert!(lockfile.verify().is_ok());
    assert!(lockfile.satisfies(&root));
    assert_eq!(
        BuildOrderComputer::new(&resolved).compute_build_order().unwrap(),
        vec!["fmt", "spdlog", "app"]
    );
}

#[test]
fn test_invalid_manifest_is_fatal() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("mule.toml");
    write(
        &path,
        r#"
        [package]
        name = "Bad_Name"
        version = "1.0.0"
    "#,
    );

    match load_package(&path) {
        Err(PackageError::ValidationError(msg)) => assert!(msg.contains("Bad_Name")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_bad_range_is_fatal() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("mule.toml");
    write(
        &path,
        r#"
        [package]
        name = "app"
        version = "1.0.0"

        [dependencies]
        fmt = "not a range"
    "#,
    );

    assert!(matches!(
        load_package(&path),
        Err(PackageError::InvalidField { .. })
    ));
}
