//! Build command - resolve, plan and run the compile/link graph

use crate::project::Project;
use anyhow::{bail, Context, Result};
use mule_build::{
    index_sources, index_tests, ArtifactCache, BuildGraph, CompilerRunner, ExecutionReport, GraphBuilder, Profile,
    Scheduler, TaskState, Toolchain,
};
use std::path::PathBuf;
use std::str::FromStr;

/// Build command arguments
#[derive(Debug, Default)]
pub struct BuildArgs {
    /// Refuse to change mule.lock
    pub locked: bool,
}

/// A finished, successful build
pub struct Built {
    pub profile: Profile,
    pub graph: BuildGraph,
    pub report: ExecutionReport,
    pub runner: CompilerRunner,
}

impl Built {
    /// Copy the root package's targets to their plain locations
    pub fn install(&self, project: &Project) -> Result<Vec<PathBuf>> {
        self.runner
            .install(&self.graph, &self.report, project.package.name())
            .context("Failed to install build outputs")
    }
}

/// Run the build command
pub fn run(project: &Project, args: BuildArgs) -> Result<()> {
    let built = execute(project, args.locked, false)?;
    built.install(project)?;
    println!("Finished {} in {}", built.profile, built.runner.target_dir().display());
    Ok(())
}

/// Resolve, plan and execute; an error if any task failed
///
/// With `with_tests`, the root package's test binaries are planned too.
pub fn execute(project: &Project, locked: bool, with_tests: bool) -> Result<Built> {
    let profile = Profile::from_str(project.config.profile())?;
    let resolved = project.resolve(locked)?;
    let sources = index_sources(&resolved).context("Failed to scan sources")?;
    let mut builder = GraphBuilder::new().with_profile(profile.default_config());
    if with_tests {
        builder = builder.with_tests(index_tests(&resolved).context("Failed to scan tests")?);
    }
    let graph = builder.build(&resolved, &sources)?;

    let toolchain = match project.config.compiler() {
        Some(program) => Toolchain::from_program(program)?,
        None => Toolchain::detect()?,
    };
    tracing::info!("Using {} ({})", toolchain.kind, toolchain.program.display());

    let target_dir = project.config.target_dir().join(profile.name());
    let runner = CompilerRunner::new(toolchain, &target_dir);
    let cache_dir = project.config.cache_dir();
    let cache = ArtifactCache::open(&cache_dir)
        .with_context(|| format!("Failed to open build cache {}", cache_dir.display()))?;

    let scheduler = Scheduler::new(project.config.effective_jobs());
    tracing::debug!(
        "Running {} task(s) with {} worker(s)",
        graph.len(),
        scheduler.parallelism()
    );
    let report = scheduler.execute(&graph, &cache, &runner);
    cache.persist().context("Failed to write build cache")?;

    print_summary(profile, &report);

    if !report.is_success() {
        for (key, failure) in report.failures() {
            eprintln!("error: {} failed", key);
            eprintln!("{}", failure.message);
        }
        let failed = report.count(TaskState::Failed);
        let skipped = report.count(TaskState::DependencyFailed);
        bail!(
            "build failed: {} task(s) failed, {} skipped because a dependency failed",
            failed,
            skipped
        );
    }

    Ok(Built {
        profile,
        graph,
        report,
        runner,
    })
}

fn print_summary(profile: Profile, report: &ExecutionReport) {
    println!(
        "{} build: {} built, {} cached, {} failed in {:.2}s",
        profile,
        report.count(TaskState::Succeeded),
        report.count(TaskState::SkippedCached),
        report.count(TaskState::Failed),
        report.elapsed().as_secs_f64()
    );
}
