//! Parallel execution of a build graph
//!
//! A single coordinator owns every task state. It dispatches ready tasks to a
//! rayon pool, at most `parallelism` at a time, and receives completions over
//! a channel. Workers only run the task and store its artifact in the cache.

use crate::cache::{Artifact, ArtifactCache};
use crate::error::TaskFailure;
use crate::graph::{BuildGraph, Task, TaskId};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// Runs one task, typically by invoking a compiler
///
/// `inputs` are the artifacts of the task's predecessors, in predecessor order.
pub trait TaskRunner: Sync {
    fn run_task(&self, task: &Task, inputs: &[Artifact]) -> Result<Artifact, TaskFailure>;
}

impl<F> TaskRunner for F
where
    F: Fn(&Task, &[Artifact]) -> Result<Artifact, TaskFailure> + Sync,
{
    fn run_task(&self, task: &Task, inputs: &[Artifact]) -> Result<Artifact, TaskFailure> {
        self(task, inputs)
    }
}

/// Lifecycle of a task during one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting on predecessors, or never dispatched
    Pending,
    /// All predecessors done; queued for dispatch
    Ready,
    Running,
    Succeeded,
    Failed,
    /// Output found in the cache; the runner was not called
    SkippedCached,
    /// A transitive predecessor failed
    DependencyFailed,
}

impl TaskState {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::SkippedCached)
    }
}

/// Shared flag that stops further dispatching when set
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Overall result of an execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    /// Only tasks that were attempted and failed are listed
    Failure { failed: Vec<TaskId> },
}

/// What happened to one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Built,
    Cached,
    Failed,
    NotAttempted,
}

/// Final state of every task after [`Scheduler::execute`]
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    states: Vec<TaskState>,
    artifacts: Vec<Option<Artifact>>,
    failures: BTreeMap<TaskId, TaskFailure>,
    keys: Vec<String>,
    elapsed: Duration,
    cancelled: bool,
}

impl ExecutionReport {
    pub fn status(&self) -> BuildStatus {
        if self.states.iter().all(TaskState::is_success) {
            BuildStatus::Success
        } else {
            BuildStatus::Failure {
                failed: self.failures.keys().copied().collect(),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == BuildStatus::Success
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.states.get(id.index()).copied()
    }

    pub fn outcome(&self, id: TaskId) -> Option<TaskOutcome> {
        self.state(id).map(|state| match state {
            TaskState::Succeeded => TaskOutcome::Built,
            TaskState::SkippedCached => TaskOutcome::Cached,
            TaskState::Failed => TaskOutcome::Failed,
            TaskState::Pending | TaskState::Ready | TaskState::Running | TaskState::DependencyFailed => {
                TaskOutcome::NotAttempted
            }
        })
    }

    pub fn artifact(&self, id: TaskId) -> Option<&Artifact> {
        self.artifacts.get(id.index()).and_then(Option::as_ref)
    }

    pub fn failure(&self, id: TaskId) -> Option<&TaskFailure> {
        self.failures.get(&id)
    }

    /// Failed tasks with their key and failure, in id order
    pub fn failures(&self) -> impl Iterator<Item = (&str, &TaskFailure)> {
        self.failures
            .iter()
            .map(|(id, failure)| (self.keys[id.index()].as_str(), failure))
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.states.iter().filter(|s| **s == state).count()
    }

    pub fn key(&self, id: TaskId) -> Option<&str> {
        self.keys.get(id.index()).map(String::as_str)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether dispatching stopped because the cancel token was set
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Bounded-parallelism executor
#[derive(Debug, Clone)]
pub struct Scheduler {
    parallelism: NonZeroUsize,
    cancel: CancelToken,
}

impl Scheduler {
    pub fn new(parallelism: NonZeroUsize) -> Self {
        Self {
            parallelism,
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally owned token, such as one set from a signal handler
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn parallelism(&self) -> NonZeroUsize {
        self.parallelism
    }

    /// Run every task of `graph`, consulting and filling `cache`
    ///
    /// Task failures do not abort the run: only dependents of a failed task are
    /// skipped. A fatal failure or cancellation stops dispatching; tasks already
    /// running finish and everything else stays `Pending`.
    pub fn execute<R>(&self, graph: &BuildGraph, cache: &ArtifactCache, runner: &R) -> ExecutionReport
    where
        R: TaskRunner + ?Sized,
    {
        let start = Instant::now();
        let mut run = Run::new(graph);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism.get())
            .thread_name(|i| format!("mule-worker-{}", i))
            .build();
        match pool {
            Ok(pool) => pool.in_place_scope(|scope| run.drive(scope, cache, runner, self)),
            Err(e) => {
                tracing::warn!("Could not start worker pool ({}); using the global pool", e);
                rayon::in_place_scope(|scope| run.drive(scope, cache, runner, self))
            }
        }

        run.finish(start.elapsed())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::new(parallelism)
    }
}

/// Execute `graph` with `parallelism` workers
pub fn execute<R>(graph: &BuildGraph, cache: &ArtifactCache, runner: &R, parallelism: NonZeroUsize) -> ExecutionReport
where
    R: TaskRunner + ?Sized,
{
    Scheduler::new(parallelism).execute(graph, cache, runner)
}

struct Completion {
    id: TaskId,
    result: Result<Artifact, TaskFailure>,
}

/// Coordinator state of one execution
struct Run<'g> {
    graph: &'g BuildGraph,
    states: Vec<TaskState>,
    artifacts: Vec<Option<Artifact>>,
    failures: BTreeMap<TaskId, TaskFailure>,
    /// Unfinished predecessors per task
    waiting_on: Vec<usize>,
    ready: VecDeque<TaskId>,
    halted: bool,
    cancelled: bool,
}

impl<'g> Run<'g> {
    fn new(graph: &'g BuildGraph) -> Self {
        let waiting_on: Vec<usize> = graph.tasks().iter().map(|t| t.predecessors.len()).collect();
        let mut states = vec![TaskState::Pending; graph.len()];
        let mut ready = VecDeque::new();
        for id in graph.ids() {
            if waiting_on[id.index()] == 0 {
                states[id.index()] = TaskState::Ready;
                ready.push_back(id);
            }
        }

        Self {
            graph,
            states,
            artifacts: vec![None; graph.len()],
            failures: BTreeMap::new(),
            waiting_on,
            ready,
            halted: false,
            cancelled: false,
        }
    }

    fn drive<'s, R>(&mut self, scope: &rayon::Scope<'s>, cache: &'s ArtifactCache, runner: &'s R, scheduler: &Scheduler)
    where
        'g: 's,
        R: TaskRunner + ?Sized,
    {
        let (tx, rx) = mpsc::channel::<Completion>();
        let limit = scheduler.parallelism.get();
        let mut in_flight = 0usize;

        loop {
            if !self.halted && scheduler.cancel.is_cancelled() {
                tracing::info!("Build cancelled; waiting for {} running task(s)", in_flight);
                self.halted = true;
                self.cancelled = true;
            }

            while !self.halted && in_flight < limit {
                let Some(id) = self.ready.pop_front() else {
                    break;
                };
                let graph: &'s BuildGraph = self.graph;
                let task = &graph[id];

                if let Some(artifact) = cache.lookup(&task.fingerprint) {
                    tracing::debug!("Fresh {} ({})", task.key, task.fingerprint.short());
                    self.states[id.index()] = TaskState::SkippedCached;
                    self.artifacts[id.index()] = Some(artifact);
                    self.release_dependents(id);
                    continue;
                }

                let inputs: Vec<Artifact> = task
                    .predecessors
                    .iter()
                    .filter_map(|p| self.artifacts[p.index()].clone())
                    .collect();
                self.states[id.index()] = TaskState::Running;
                in_flight += 1;
                tracing::debug!("Running {}", task.key);

                let tx = tx.clone();
                scope.spawn(move |_| {
                    let result = run_task(task, &inputs, runner, cache);
                    // The coordinator outlives every worker
                    let _ = tx.send(Completion { id, result });
                });
            }

            if in_flight == 0 {
                break;
            }
            let Ok(Completion { id, result }) = rx.recv() else {
                break;
            };
            in_flight -= 1;

            match result {
                Ok(artifact) => {
                    self.states[id.index()] = TaskState::Succeeded;
                    self.artifacts[id.index()] = Some(artifact);
                    self.release_dependents(id);
                }
                Err(failure) => self.record_failure(id, failure),
            }
        }
    }

    fn release_dependents(&mut self, id: TaskId) {
        let graph = self.graph;
        for &dependent in graph.dependents(id) {
            let waiting = &mut self.waiting_on[dependent.index()];
            *waiting = waiting.saturating_sub(1);
            if *waiting == 0 && self.states[dependent.index()] == TaskState::Pending {
                self.states[dependent.index()] = TaskState::Ready;
                self.ready.push_back(dependent);
            }
        }
    }

    fn record_failure(&mut self, id: TaskId, failure: TaskFailure) {
        let graph = self.graph;
        let key = &graph[id].key;
        if failure.is_fatal() {
            tracing::error!("{} failed: {}; stopping build", key, failure);
            self.halted = true;
        } else {
            tracing::warn!("{} failed: {}", key, failure);
        }
        self.states[id.index()] = TaskState::Failed;
        self.failures.insert(id, failure);

        let mut stack: Vec<TaskId> = graph.dependents(id).to_vec();
        while let Some(dependent) = stack.pop() {
            let state = &mut self.states[dependent.index()];
            if *state == TaskState::Pending {
                *state = TaskState::DependencyFailed;
                stack.extend_from_slice(graph.dependents(dependent));
            }
        }
    }

    fn finish(mut self, elapsed: Duration) -> ExecutionReport {
        // Halted before dispatch: queued tasks were never attempted
        for id in self.ready.drain(..) {
            self.states[id.index()] = TaskState::Pending;
        }

        let report = ExecutionReport {
            states: self.states,
            artifacts: self.artifacts,
            failures: self.failures,
            keys: self.graph.tasks().iter().map(|t| t.key.clone()).collect(),
            elapsed,
            cancelled: self.cancelled,
        };
        tracing::info!(
            "Finished in {:.2?}: {} built, {} cached, {} failed, {} skipped",
            elapsed,
            report.count(TaskState::Succeeded),
            report.count(TaskState::SkippedCached),
            report.count(TaskState::Failed),
            report.count(TaskState::DependencyFailed) + report.count(TaskState::Pending),
        );
        report
    }
}

/// Worker side: run the task, turning panics into fatal failures
fn run_task<R>(task: &Task, inputs: &[Artifact], runner: &R, cache: &ArtifactCache) -> Result<Artifact, TaskFailure>
where
    R: TaskRunner + ?Sized,
{
    let result = panic::catch_unwind(AssertUnwindSafe(|| runner.run_task(task, inputs)))
        .unwrap_or_else(|payload| Err(TaskFailure::fatal(format!("task panicked: {}", panic_message(&payload)))));

    if let Ok(artifact) = &result {
        cache.store(task.fingerprint, artifact.clone());
    }
    result
}

fn panic_message(payload: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build, TaskKind};
    use crate::source::{SourceIndex, SourceUnit};
    use mule_package::{resolve, MemoryUniverse, Package};
    use pretty_assertions::assert_eq;
    use semver::Version;
    use std::sync::atomic::AtomicUsize;

    fn single_package(files: &[&str]) -> BuildGraph {
        let root = Package::new("app", Version::new(1, 0, 0));
        let resolved = resolve(&root, &MemoryUniverse::new()).unwrap();
        let units: Vec<SourceUnit> = files.iter().map(|f| SourceUnit::new(*f, f.as_bytes())).collect();
        let sources: SourceIndex = [("app".to_string(), units)].into_iter().collect();
        build(&resolved, &sources).unwrap()
    }

    fn ok_runner(task: &Task, _inputs: &[Artifact]) -> Result<Artifact, TaskFailure> {
        Ok(Artifact::new(format!("out/{}", task.key), task.key.as_bytes()))
    }

    fn two(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_empty_graph_succeeds() {
        let report = execute(&BuildGraph::default(), &ArtifactCache::new(), &ok_runner, two(2));
        assert_eq!(report.status(), BuildStatus::Success);
    }

    #[test]
    fn test_link_receives_objects() {
        let graph = single_package(&["src/a.cpp", "src/b.cpp"]);
        let runner = |task: &Task, inputs: &[Artifact]| {
            if let TaskKind::Link { .. } = task.kind {
                assert_eq!(inputs.len(), 2);
            }
            ok_runner(task, inputs)
        };

        let report = execute(&graph, &ArtifactCache::new(), &runner, two(2));
        assert!(report.is_success());
        assert_eq!(report.count(TaskState::Succeeded), 3);
    }

    #[test]
    fn test_parallelism_bound() {
        let graph = single_package(&["src/a.cpp", "src/b.cpp", "src/c.cpp", "src/d.cpp", "src/e.cpp"]);
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let runner = |task: &Task, inputs: &[Artifact]| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            running.fetch_sub(1, Ordering::SeqCst);
            ok_runner(task, inputs)
        };

        let report = execute(&graph, &ArtifactCache::new(), &runner, two(2));
        assert!(report.is_success());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_panic_is_fatal_failure() {
        let graph = single_package(&["src/a.cpp"]);
        let runner = |task: &Task, inputs: &[Artifact]| {
            if task.is_compile() {
                panic!("boom");
            }
            ok_runner(task, inputs)
        };

        let report = execute(&graph, &ArtifactCache::new(), &runner, two(1));
        let compile = graph.tasks()[0].id;
        assert!(report.failure(compile).unwrap().is_fatal());
        assert!(report.failure(compile).unwrap().message.contains("boom"));
        assert_eq!(report.outcome(graph.tasks()[1].id), Some(TaskOutcome::NotAttempted));
    }

    #[test]
    fn test_cancelled_before_start() {
        let graph = single_package(&["src/a.cpp"]);
        let scheduler = Scheduler::new(two(2));
        scheduler.cancel_token().cancel();

        let report = scheduler.execute(&graph, &ArtifactCache::new(), &ok_runner);
        assert!(report.was_cancelled());
        assert_eq!(report.count(TaskState::Pending), graph.len());
        assert_eq!(report.status(), BuildStatus::Failure { failed: vec![] });
    }
}
