/// Build system error types
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid build graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Package error: {0}")]
    Package(#[from] mule_package::PackageError),

    #[error("No suitable compiler (clang++, g++, cl) found in PATH")]
    ToolchainNotFound,

    #[error("Unknown build profile: {0} (expected dev or release)")]
    UnknownProfile(String),

    #[error("Build cache error: {0}")]
    CacheError(String),

    #[error("Source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("I/O error at {}: {error}", path.display())]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    pub fn cache(error: impl ToString) -> Self {
        Self::CacheError(error.to_string())
    }
}

/// Structural problems found while building the task graph
///
/// All of these abort before execution; no partial graph is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Circular target dependency detected: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("Target '{target}' required by '{required_by}' does not exist")]
    UnknownTarget { target: String, required_by: String },

    #[error("Target '{target}' has no sources and requires nothing")]
    EmptyTarget { target: String },

    #[error("No source index entry for package '{package}'")]
    MissingSources { package: String },

    #[error("Two test sources would both build '{test}'")]
    DuplicateTest { test: String },
}

/// Failure of a single task
///
/// Not an error of the whole run: only the task's dependents are affected,
/// unless the failure is fatal, in which case dispatching stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub message: String,
    pub fatal: bool,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    /// A failure that makes further dispatch pointless, such as a missing toolchain
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fatal {
            write!(f, "fatal: {}", self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for TaskFailure {}
