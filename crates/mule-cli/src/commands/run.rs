//! Run command - build, then execute a binary target of the project

use crate::commands::build;
use crate::project::Project;
use anyhow::{bail, Context, Result};
use mule_package::{TargetDecl, TargetKind};
use std::process::{Command, ExitCode};

/// Run command arguments
#[derive(Debug, Default)]
pub struct RunArgs {
    pub locked: bool,
    /// Binary target to run when the project has several
    pub bin: Option<String>,
    /// Passed to the program unchanged
    pub args: Vec<String>,
}

/// Run the run command; the exit code is the program's
pub fn run(project: &Project, args: RunArgs) -> Result<ExitCode> {
    let target = select_binary(&project.package.targets(), project.package.name(), args.bin.as_deref())?;

    let built = build::execute(project, args.locked, false)?;
    built.install(project)?;
    let program = built.runner.installed_path(TargetKind::Binary, &target);
    if !program.exists() {
        bail!("{} was not produced by the build", program.display());
    }

    println!("Running {}", program.display());
    let status = Command::new(&program)
        .args(&args.args)
        .status()
        .with_context(|| format!("Failed to start {}", program.display()))?;

    Ok(match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => {
            tracing::warn!("{} was terminated by a signal", target);
            ExitCode::FAILURE
        }
    })
}

/// The requested binary, the only binary, or the one named after the package
fn select_binary(targets: &[TargetDecl], package: &str, requested: Option<&str>) -> Result<String> {
    let binaries: Vec<&str> = targets
        .iter()
        .filter(|t| t.kind == TargetKind::Binary)
        .map(|t| t.name.as_str())
        .collect();

    if let Some(name) = requested {
        if binaries.contains(&name) {
            return Ok(name.to_string());
        }
        bail!("no binary target named '{}' (available: {})", name, binaries.join(", "));
    }

    match binaries.as_slice() {
        [] => bail!("{} has no binary target to run", package),
        [only] => Ok(only.to_string()),
        _ if binaries.contains(&package) => Ok(package.to_string()),
        _ => bail!(
            "{} has several binary targets; pick one with --bin ({})",
            package,
            binaries.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<TargetDecl> {
        vec![
            TargetDecl::new("core", TargetKind::StaticLib),
            TargetDecl::new("tool", TargetKind::Binary),
            TargetDecl::new("bench", TargetKind::Binary),
        ]
    }

    #[test]
    fn test_only_binary_is_selected() {
        let targets = vec![TargetDecl::new("app", TargetKind::Binary)];
        assert_eq!(select_binary(&targets, "app", None).unwrap(), "app");
    }

    #[test]
    fn test_requested_binary() {
        assert_eq!(select_binary(&targets(), "app", Some("bench")).unwrap(), "bench");
        let err = select_binary(&targets(), "app", Some("core")).unwrap_err();
        assert!(err.to_string().contains("no binary target named 'core'"));
    }

    #[test]
    fn test_ambiguous_binaries() {
        let err = select_binary(&targets(), "app", None).unwrap_err();
        assert!(err.to_string().contains("--bin"));
    }

    #[test]
    fn test_library_only_package() {
        let targets = vec![TargetDecl::new("core", TargetKind::StaticLib)];
        assert!(select_binary(&targets, "core", None).is_err());
    }
}
