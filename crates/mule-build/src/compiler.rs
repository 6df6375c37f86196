//! Toolchain detection and the compiler-backed task runner

use crate::cache::Artifact;
use crate::error::{BuildError, BuildResult, TaskFailure};
use crate::graph::{BuildGraph, Task, TaskKind};
use crate::scheduler::{ExecutionReport, TaskRunner};
use crate::targets::OutputNaming;
use mule_package::TargetKind;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Compiler family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolchainKind {
    Clang,
    Gcc,
    Msvc,
}

impl ToolchainKind {
    /// Detection order and executable names
    pub const SEARCH_ORDER: [(ToolchainKind, &'static str); 3] =
        [(Self::Clang, "clang++"), (Self::Gcc, "g++"), (Self::Msvc, "cl")];

    /// Guess the family from an executable name such as `g++-13` or `cl.exe`
    pub fn from_program(program: &str) -> Self {
        let name = Path::new(program)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(program)
            .to_lowercase();
        if name == "cl" || name == "clang-cl" {
            Self::Msvc
        } else if name.contains("clang") {
            Self::Clang
        } else {
            Self::Gcc
        }
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clang => write!(f, "clang"),
            Self::Gcc => write!(f, "gcc"),
            Self::Msvc => write!(f, "msvc"),
        }
    }
}

/// A located compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub kind: ToolchainKind,
    pub program: PathBuf,
}

impl Toolchain {
    pub fn new(kind: ToolchainKind, program: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
        }
    }

    /// First of clang++, g++, cl found in `PATH`
    pub fn detect() -> BuildResult<Self> {
        for (kind, name) in ToolchainKind::SEARCH_ORDER {
            if let Ok(program) = which::which(name) {
                tracing::debug!("Using {} compiler at {}", kind, program.display());
                return Ok(Self::new(kind, program));
            }
        }
        Err(BuildError::ToolchainNotFound)
    }

    /// A compiler named in configuration, looked up in `PATH` unless it is a path
    pub fn from_program(program: &str) -> BuildResult<Self> {
        let path = which::which(program).map_err(|_| BuildError::ToolchainNotFound)?;
        Ok(Self::new(ToolchainKind::from_program(program), path))
    }

    pub fn naming(&self) -> OutputNaming {
        match self.kind {
            ToolchainKind::Msvc => OutputNaming::Windows,
            ToolchainKind::Clang | ToolchainKind::Gcc => OutputNaming::host(),
        }
    }
}

/// Translate a GNU-style flag for `cl`; `None` drops it
fn msvc_flag(flag: &str) -> Option<String> {
    let translated = match flag {
        "-O0" => "/Od".to_string(),
        "-O1" => "/O1".to_string(),
        "-O2" | "-O3" => "/O2".to_string(),
        "-g" => "/Zi".to_string(),
        "-fPIC" => return None,
        "-shared" => "/LD".to_string(),
        _ => {
            if let Some(std) = flag.strip_prefix("-std=") {
                format!("/std:{}", std)
            } else if let Some(dir) = flag.strip_prefix("-I") {
                format!("/I{}", dir)
            } else if let Some(define) = flag.strip_prefix("-D") {
                format!("/D{}", define)
            } else if let Some(dir) = flag.strip_prefix("-L") {
                format!("/LIBPATH:{}", dir)
            } else if let Some(lib) = flag.strip_prefix("-l") {
                format!("{}.lib", lib)
            } else {
                flag.to_string()
            }
        }
    };
    Some(translated)
}

/// Runs compile and link tasks with a real toolchain
#[derive(Debug, Clone)]
pub struct CompilerRunner {
    toolchain: Toolchain,
    target_dir: PathBuf,
    naming: OutputNaming,
}

impl CompilerRunner {
    pub fn new(toolchain: Toolchain, target_dir: impl Into<PathBuf>) -> Self {
        let naming = toolchain.naming();
        Self {
            toolchain,
            target_dir: target_dir.into(),
            naming,
        }
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Object file of a compile task
    pub fn object_path(&self, task: &Task) -> PathBuf {
        self.target_dir
            .join("obj")
            .join(self.naming.object_file_name(&task.fingerprint))
    }

    /// Where a link task writes its output
    ///
    /// Keyed by the task fingerprint, so a cached entry keeps pointing at the
    /// bytes it recorded after other builds of the same target.
    pub fn output_path(&self, task: &Task, kind: TargetKind, name: &str) -> PathBuf {
        self.target_dir
            .join("out")
            .join(task.fingerprint.to_hex())
            .join(self.naming.output_file_name(kind, name))
    }

    /// Plain location of a target in the target directory
    pub fn installed_path(&self, kind: TargetKind, name: &str) -> PathBuf {
        self.target_dir.join(self.naming.output_file_name(kind, name))
    }

    /// Copy the linked targets of `package` to their plain locations
    ///
    /// Test binaries and tasks without an artifact are skipped. Returns the
    /// installed paths in task order.
    pub fn install(&self, graph: &BuildGraph, report: &ExecutionReport, package: &str) -> BuildResult<Vec<PathBuf>> {
        let mut installed = Vec::new();
        for task in graph.tasks().iter().filter(|t| t.package == package && !t.is_test()) {
            let TaskKind::Link { target, kind, .. } = &task.kind else {
                continue;
            };
            let Some(artifact) = report.artifact(task.id) else {
                continue;
            };

            let dest = self.installed_path(*kind, target);
            if !artifact.with_path(&dest).matches_file() {
                if dest.exists() {
                    fs::remove_file(&dest).map_err(|e| BuildError::io(&dest, e))?;
                }
                fs::create_dir_all(&self.target_dir).map_err(|e| BuildError::io(&self.target_dir, e))?;
                fs::copy(&artifact.path, &dest).map_err(|e| BuildError::io(&dest, e))?;
                tracing::debug!("Installed {}", dest.display());
            }
            installed.push(dest);
        }
        Ok(installed)
    }

    fn is_msvc(&self) -> bool {
        self.toolchain.kind == ToolchainKind::Msvc
    }

    fn flags(&self, task: &Task) -> Vec<String> {
        if self.is_msvc() {
            task.flags.iter().filter_map(|f| msvc_flag(f)).collect()
        } else {
            task.flags.clone()
        }
    }

    pub fn compile_command(&self, task: &Task, source: &Path, object: &Path) -> Command {
        let mut cmd = Command::new(&self.toolchain.program);
        if self.is_msvc() {
            cmd.args(["/nologo", "/EHsc"]).args(self.flags(task)).arg("/c").arg(source);
            cmd.arg(concat_arg("/Fo", object));
        } else {
            cmd.args(self.flags(task)).arg("-c").arg(source).arg("-o").arg(object);
        }
        cmd
    }

    pub fn link_command(&self, task: &Task, kind: TargetKind, inputs: &[Artifact], output: &Path) -> Command {
        let (objects, libraries) = task.split_inputs(inputs);
        let objects = objects.iter().map(|a| a.path.as_path());
        let libraries = libraries.iter().map(|a| a.path.as_path());

        if kind == TargetKind::StaticLib {
            return if self.is_msvc() {
                let mut cmd = Command::new("lib");
                cmd.arg("/NOLOGO").arg(concat_arg("/OUT:", output)).args(objects);
                cmd
            } else {
                let mut cmd = Command::new("ar");
                cmd.arg("rcs").arg(output).args(objects);
                cmd
            };
        }

        let mut cmd = Command::new(&self.toolchain.program);
        if self.is_msvc() {
            let (lib_paths, flags): (Vec<String>, Vec<String>) =
                self.flags(task).into_iter().partition(|f| f.starts_with("/LIBPATH:"));
            cmd.arg("/nologo").args(objects).args(libraries).args(flags);
            cmd.arg(concat_arg("/Fe", output));
            if !lib_paths.is_empty() {
                cmd.arg("/link").args(lib_paths);
            }
        } else {
            cmd.args(objects).args(libraries).arg("-o").arg(output).args(self.flags(task));
        }
        cmd
    }

    fn run(&self, task: &Task, mut cmd: Command, output: &Path) -> Result<Artifact, TaskFailure> {
        if let Some(dir) = output.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| TaskFailure::fatal(format!("cannot create {}: {}", dir.display(), e)))?;
        }

        tracing::trace!("{:?}", cmd);
        let result = cmd.output().map_err(|e| {
            TaskFailure::fatal(format!("failed to run {}: {}", cmd.get_program().to_string_lossy(), e))
        })?;

        if !result.status.success() {
            // cl reports diagnostics on stdout
            let mut message = String::from_utf8_lossy(&result.stderr).into_owned();
            message.push_str(&String::from_utf8_lossy(&result.stdout));
            let message = message.trim_end();
            return Err(TaskFailure::new(if message.is_empty() {
                format!("{} exited with {}", task.key, result.status)
            } else {
                message.to_string()
            }));
        }

        Artifact::from_file(output).map_err(|e| TaskFailure::new(e.to_string()))
    }
}

fn concat_arg(prefix: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path);
    arg
}

impl TaskRunner for CompilerRunner {
    fn run_task(&self, task: &Task, inputs: &[Artifact]) -> Result<Artifact, TaskFailure> {
        match &task.kind {
            TaskKind::Compile { source, relative } => {
                tracing::info!("Compiling {} ({})", relative.display(), task.package);
                let object = self.object_path(task);
                self.run(task, self.compile_command(task, source, &object), &object)
            }
            TaskKind::Link { target, kind, test, .. } => {
                if *test {
                    tracing::info!("Linking test {}", target);
                } else {
                    tracing::info!("Linking {} {}", kind, target);
                }
                let output = self.output_path(task, *kind, target);
                // ar appends to an existing archive
                if *kind == TargetKind::StaticLib && output.exists() {
                    fs::remove_file(&output)
                        .map_err(|e| TaskFailure::new(format!("cannot replace {}: {}", output.display(), e)))?;
                }
                self.run(task, self.link_command(task, *kind, inputs, &output), &output)
            }
        }
    }
}
