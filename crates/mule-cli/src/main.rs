use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use mule_config::GlobalConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod project;

use project::Project;

/// C++ build system and package manager.
///
/// Resolves the dependencies declared in mule.toml, plans one compile task
/// per source file and one link task per target, and runs them in parallel,
/// skipping anything whose inputs have not changed.
///
/// EXAMPLES:
///     mule new hello             Create a program in ./hello
///     mule build                 Build with the dev profile
///     mule build --release       Build optimized
///     mule build --locked -j 4   Build with mule.lock as is, 4 jobs
///     mule run -- --port 80      Build and run, passing arguments
///     mule test                  Build and run the tests
///     mule graph                 Show planned tasks
///     mule lock                  Re-resolve and rewrite mule.lock
///
/// ENVIRONMENT VARIABLES:
///     MULE_JOBS, MULE_COMPILER, MULE_PROFILE, MULE_CACHE_DIR,
///     MULE_TARGET_DIR, MULE_REGISTRY   Override ~/.mule/config.toml
///     RUST_LOG                         Overrides -v
#[derive(Parser)]
#[command(name = "mule")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// More output (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Project directory (defaults to the current directory)
    #[arg(short = 'C', long = "directory", global = true)]
    directory: Option<PathBuf>,

    /// Local package registry root
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project directory
    ///
    /// EXAMPLES:
    ///     mule new hello           Program with src/main.cpp
    ///     mule new parser --lib    Static library with a header and a unit test
    New {
        /// Package and directory name
        name: String,
        /// Create a static library
        #[arg(long)]
        lib: bool,
    },

    /// Build the project and its dependencies
    ///
    /// EXAMPLES:
    ///     mule build                   Build with the default profile
    ///     mule build --release         Build optimized release
    ///     mule build --compiler g++    Use a specific compiler
    #[command(visible_alias = "b")]
    Build {
        /// Build profile (dev or release)
        #[arg(long, short = 'p')]
        profile: Option<String>,
        /// Build in release mode (shorthand for --profile=release)
        #[arg(long, conflicts_with = "profile")]
        release: bool,
        /// Maximum number of parallel tasks
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
        /// Compiler program to use instead of searching PATH
        #[arg(long)]
        compiler: Option<String>,
        /// Fail instead of updating mule.lock
        #[arg(long)]
        locked: bool,
    },

    /// Build, then run a binary target
    #[command(visible_alias = "r")]
    Run {
        /// Build profile (dev or release)
        #[arg(long, short = 'p')]
        profile: Option<String>,
        /// Build in release mode (shorthand for --profile=release)
        #[arg(long, conflicts_with = "profile")]
        release: bool,
        /// Binary target to run
        #[arg(long)]
        bin: Option<String>,
        /// Compiler program to use instead of searching PATH
        #[arg(long)]
        compiler: Option<String>,
        /// Fail instead of updating mule.lock
        #[arg(long)]
        locked: bool,
        /// Arguments for the program
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Build and run unit tests (src/**/*_test.cpp) and integration tests (tests/*.cpp)
    #[command(visible_alias = "t")]
    Test {
        /// Only run tests whose name contains this
        pattern: Option<String>,
        /// Build profile (dev or release)
        #[arg(long, short = 'p')]
        profile: Option<String>,
        /// Maximum number of parallel tasks
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
        /// Compiler program to use instead of searching PATH
        #[arg(long)]
        compiler: Option<String>,
        /// Fail instead of updating mule.lock
        #[arg(long)]
        locked: bool,
        /// Print results as JSON
        #[arg(long, env = "MULE_JSON")]
        json: bool,
    },

    /// Resolve dependencies and write mule.lock
    Lock,

    /// Remove build outputs and the artifact cache
    Clean,

    /// Print the task graph without building
    Graph {
        /// Build profile used for flags and fingerprints
        #[arg(long, short = 'p')]
        profile: Option<String>,
        /// Fail instead of updating mule.lock
        #[arg(long)]
        locked: bool,
        /// Include test binaries
        #[arg(long)]
        tests: bool,
        /// Print tasks as JSON
        #[arg(long, env = "MULE_JSON")]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set
fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("mule=warn"),
        1 => EnvFilter::new("mule=info"),
        _ => EnvFilter::new("mule=debug"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let mut overrides = GlobalConfig {
        registry: cli.registry.map(|dir| cwd.join(dir)),
        ..Default::default()
    };
    let start_dir = match cli.directory {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };

    match cli.command {
        Commands::New { name, lib } => {
            commands::new::run(&start_dir, commands::new::NewArgs { name, lib })?;
        }
        Commands::Build {
            profile,
            release,
            jobs,
            compiler,
            locked,
        } => {
            overrides.profile = if release { Some("release".to_string()) } else { profile };
            overrides.jobs = jobs;
            overrides.compiler = compiler;
            let project = Project::load(&start_dir, &overrides)?;
            commands::build::run(&project, commands::build::BuildArgs { locked })?;
        }
        Commands::Run {
            profile,
            release,
            bin,
            compiler,
            locked,
            args,
        } => {
            overrides.profile = if release { Some("release".to_string()) } else { profile };
            overrides.compiler = compiler;
            let project = Project::load(&start_dir, &overrides)?;
            return commands::run::run(&project, commands::run::RunArgs { locked, bin, args });
        }
        Commands::Test {
            pattern,
            profile,
            jobs,
            compiler,
            locked,
            json,
        } => {
            overrides.profile = profile;
            overrides.jobs = jobs;
            overrides.compiler = compiler;
            let project = Project::load(&start_dir, &overrides)?;
            commands::test::run(
                &project,
                commands::test::TestArgs {
                    locked,
                    pattern,
                    json,
                },
            )?;
        }
        Commands::Lock => commands::lock::run(&Project::load(&start_dir, &overrides)?)?,
        Commands::Clean => commands::clean::run(&Project::load(&start_dir, &overrides)?)?,
        Commands::Graph {
            profile,
            locked,
            tests,
            json,
        } => {
            overrides.profile = profile;
            commands::graph::run(&Project::load(&start_dir, &overrides)?, locked, tests, json)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
