//! Mule build engine
//!
//! Provides build orchestration for resolved C++ packages including:
//! - Source discovery and include scanning
//! - Task graph construction (compile, link and test tasks)
//! - Deterministic task fingerprints
//! - Incremental artifact cache
//! - Parallel execution with bounded workers
//! - Build profiles (dev, release)

pub mod cache;
pub mod compiler;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod profile;
pub mod scheduler;
pub mod source;
pub mod targets;

// Re-export main types
pub use cache::{Artifact, ArtifactCache, CacheEntry, CacheStats, StoreOutcome};
pub use compiler::{CompilerRunner, Toolchain, ToolchainKind};
pub use error::{BuildError, BuildResult, GraphError, TaskFailure};
pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use graph::{build, BuildGraph, GraphBuilder, Task, TaskId, TaskKind};
pub use profile::{OptLevel, Profile, ProfileConfig};
pub use scheduler::{
    execute, BuildStatus, CancelToken, ExecutionReport, Scheduler, TaskOutcome, TaskRunner, TaskState,
};
pub use source::{discover_sources, discover_tests, index_sources, index_tests, SourceIndex, SourceUnit};
pub use targets::OutputNaming;
