//! Configuration loading and precedence tests

use mule_config::{ConfigError, ConfigLoader, GlobalConfig, ENV_CACHE_DIR, ENV_COMPILER, ENV_PROFILE};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_global(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, content).unwrap();
    path
}

fn create_project(dir: &Path) {
    fs::write(
        dir.join("mule.toml"),
        "[package]\nname = \"demo\"\nversion = \"1.0.0\"\n",
    )
    .unwrap();
}

// ============================================================================
// Global config file
// ============================================================================

#[test]
#[serial]
fn test_global_config_applies() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_global(
        temp_dir.path(),
        "jobs = 3\ncompiler = \"g++\"\nprofile = \"release\"\n",
    );

    let config = ConfigLoader::with_global_config_path(path)
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.effective_jobs().get(), 3);
    assert_eq!(config.compiler(), Some("g++"));
    assert_eq!(config.profile(), "release");
}

#[test]
#[serial]
fn test_missing_global_config_is_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = ConfigLoader::with_global_config_path(temp_dir.path().join("absent.toml"))
        .load_from_directory(temp_dir.path())
        .unwrap();
    assert_eq!(config.settings, GlobalConfig::default());
}

#[test]
#[serial]
fn test_malformed_global_config_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_global(temp_dir.path(), "jobs = [\n");

    let result = ConfigLoader::with_global_config_path(path).load_from_directory(temp_dir.path());
    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

#[test]
fn test_load_from_file_reports_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let result = GlobalConfig::load_from_file(&temp_dir.path().join("nope.toml"));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

// ============================================================================
// Environment overrides
// ============================================================================

#[test]
#[serial]
fn test_env_overrides_global_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_global(temp_dir.path(), "compiler = \"g++\"\n");

    env::set_var(ENV_COMPILER, "clang++");
    let config = ConfigLoader::with_global_config_path(path).load_from_directory(temp_dir.path());
    env::remove_var(ENV_COMPILER);

    assert_eq!(config.unwrap().compiler(), Some("clang++"));
}

#[rstest]
#[case("dev", true)]
#[case("release", true)]
#[case("turbo", false)]
#[serial]
fn test_env_profile_validation(#[case] profile: &str, #[case] accepted: bool) {
    let temp_dir = TempDir::new().unwrap();

    env::set_var(ENV_PROFILE, profile);
    let result = ConfigLoader::with_global_config_path(temp_dir.path().join("config.toml"))
        .load_from_directory(temp_dir.path());
    env::remove_var(ENV_PROFILE);

    assert_eq!(result.is_ok(), accepted);
}

#[test]
#[serial]
fn test_relative_cache_dir_is_anchored_at_project() {
    let temp_dir = TempDir::new().unwrap();
    create_project(temp_dir.path());
    let src = temp_dir.path().join("src");
    fs::create_dir(&src).unwrap();

    env::set_var(ENV_CACHE_DIR, ".mule-cache");
    let config = ConfigLoader::with_global_config_path(temp_dir.path().join("config.toml"))
        .load_from_directory(&src);
    env::remove_var(ENV_CACHE_DIR);

    assert_eq!(config.unwrap().cache_dir(), temp_dir.path().join(".mule-cache"));
}
