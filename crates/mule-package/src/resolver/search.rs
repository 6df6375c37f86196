//! Backtracking search over candidate versions
//!
//! Decisions live on an explicit stack of frames. Each frame remembers the
//! candidates still untried for one package and the solver state from just
//! before the decision, so backtracking is a pop and a restore.

use super::conflict::{minimal_conflicting_set, Conflict, ConflictingConstraint};
use super::version_solver::VersionSolver;
use super::ResolverError;
use crate::manifest::Package;
use crate::universe::PackageSource;
use crate::version::VersionRange;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// A range imposed on a package by a selected version of another
#[derive(Debug, Clone)]
struct Constraint {
    range: VersionRange,
    source: Arc<Package>,
}

/// Everything decided so far
#[derive(Debug, Clone, Default)]
struct SolverState {
    chosen: BTreeMap<String, Arc<Package>>,
    constraints: BTreeMap<String, Vec<Constraint>>,
    pending: VecDeque<String>,
    /// First package that required each name, for requirement chains
    parents: BTreeMap<String, String>,
}

/// One decision point
struct Frame {
    candidates: Vec<Arc<Package>>,
    next: usize,
    saved: SolverState,
}

/// Why a branch of the search failed
#[derive(Debug)]
enum Failure {
    Conflict(Conflict),
    Missing { package: String, required_by: String },
    Exhausted { steps: usize },
}

impl From<Failure> for ResolverError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Conflict(conflict) => ResolverError::Conflict(conflict),
            Failure::Missing {
                package,
                required_by,
            } => ResolverError::MissingPackage {
                package,
                required_by,
            },
            Failure::Exhausted { steps } => ResolverError::StepLimitExceeded { steps },
        }
    }
}

impl SolverState {
    /// Requirement chain from the root down to `name`
    fn path_to(&self, name: &str) -> Vec<String> {
        let mut path = vec![name.to_string()];
        let mut current = name;
        while let Some(parent) = self.parents.get(current) {
            path.push(parent.clone());
            current = parent;
        }
        path.reverse();
        path
    }

    fn describe(&self, constraints: &[&Constraint]) -> Vec<ConflictingConstraint> {
        constraints
            .iter()
            .map(|c| {
                ConflictingConstraint::new(
                    c.range.clone(),
                    c.source.id(),
                    self.path_to(c.source.name()),
                )
            })
            .collect()
    }

    /// Conflict naming the smallest set of constraints on `name` that cannot hold together
    fn conflict_for(&self, name: &str) -> Conflict {
        let all: Vec<&Constraint> = self
            .constraints
            .get(name)
            .map(|cs| cs.iter().collect())
            .unwrap_or_default();
        let ranges: Vec<VersionRange> = all.iter().map(|c| c.range.clone()).collect();
        let blamed: Vec<&Constraint> = minimal_conflicting_set(&ranges)
            .into_iter()
            .map(|i| all[i])
            .collect();

        let mut conflict = Conflict::new(name, self.describe(&blamed));
        if let Some(selected) = self.chosen.get(name) {
            conflict = conflict.with_selected(selected.version().clone());
        }
        conflict
    }

    /// Combined range every constraint on `name` allows
    fn allowed(&self, name: &str) -> VersionRange {
        self.constraints
            .get(name)
            .map(|cs| VersionRange::intersect_all(cs.iter().map(|c| &c.range)))
            .unwrap_or_default()
    }

    /// Select `package` and record the constraints it declares
    fn choose(&mut self, package: Arc<Package>) -> Result<(), Failure> {
        let name = package.name().to_string();
        self.chosen.insert(name.clone(), Arc::clone(&package));

        for dep in package.dependencies() {
            self.constraints
                .entry(dep.name.clone())
                .or_default()
                .push(Constraint {
                    range: dep.range.clone(),
                    source: Arc::clone(&package),
                });

            match self.chosen.get(&dep.name) {
                Some(existing) if !dep.range.contains(existing.version()) => {
                    return Err(Failure::Conflict(self.conflict_for(&dep.name)));
                }
                Some(_) => {}
                None => {
                    if !self.pending.contains(&dep.name) {
                        self.parents
                            .entry(dep.name.clone())
                            .or_insert_with(|| name.clone());
                        self.pending.push_back(dep.name.clone());
                    }
                }
            }
        }

        Ok(())
    }
}

/// Depth-first search for an assignment satisfying every constraint
pub(super) struct Search<'s, 'u, S: PackageSource + ?Sized> {
    solver: &'s mut VersionSolver<'u, S>,
    max_steps: usize,
    steps: usize,
    stack: Vec<Frame>,
}

impl<'s, 'u, S: PackageSource + ?Sized> Search<'s, 'u, S> {
    pub(super) fn new(solver: &'s mut VersionSolver<'u, S>, max_steps: usize) -> Self {
        Self {
            solver,
            max_steps,
            steps: 0,
            stack: Vec::new(),
        }
    }

    /// Number of decisions taken, backtracked ones included
    pub(super) fn steps(&self) -> usize {
        self.steps
    }

    pub(super) fn run(
        &mut self,
        root: &Package,
    ) -> Result<BTreeMap<String, Arc<Package>>, ResolverError> {
        let mut state = SolverState::default();
        state.choose(Arc::new(root.clone()))?;

        loop {
            let Some(name) = state.pending.pop_front() else {
                tracing::debug!(
                    "Resolved {} package(s) in {} step(s)",
                    state.chosen.len(),
                    self.steps
                );
                return Ok(state.chosen);
            };

            match self.decide(&mut state, name) {
                Ok(()) => {}
                Err(failure @ Failure::Exhausted { .. }) => return Err(failure.into()),
                Err(failure) => state = self.backtrack(failure)?,
            }
        }
    }

    /// Open a frame for `name` and take its best candidate
    fn decide(&mut self, state: &mut SolverState, name: String) -> Result<(), Failure> {
        if !self.solver.is_known(&name) {
            let required_by = state
                .parents
                .get(&name)
                .and_then(|parent| state.chosen.get(parent))
                .map(|p| p.id())
                .unwrap_or_default();
            return Err(Failure::Missing {
                package: name,
                required_by,
            });
        }

        let allowed = state.allowed(&name);
        let candidates = self.solver.find_all_satisfying(&name, &allowed);
        if candidates.is_empty() {
            return Err(Failure::Conflict(state.conflict_for(&name)));
        }

        self.count_step()?;

        let best = Arc::clone(&candidates[0]);
        tracing::debug!("Resolving {} @ {}", name, best.version());

        self.stack.push(Frame {
            candidates,
            next: 1,
            saved: state.clone(),
        });

        state.choose(best)
    }

    /// Unwind to the nearest frame with an untried candidate
    ///
    /// The first failure is the one reported when the stack runs dry.
    fn backtrack(&mut self, first: Failure) -> Result<SolverState, ResolverError> {
        tracing::trace!("Backtracking after {:?}", first);

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Err(first.into());
            };

            if frame.next >= frame.candidates.len() {
                self.stack.pop();
                continue;
            }

            let candidate = Arc::clone(&frame.candidates[frame.next]);
            frame.next += 1;
            let mut state = frame.saved.clone();

            self.count_step()?;

            tracing::debug!("Retrying {} @ {}", candidate.name(), candidate.version());
            if state.choose(candidate).is_ok() {
                return Ok(state);
            }
        }
    }

    fn count_step(&mut self) -> Result<(), Failure> {
        if self.steps >= self.max_steps {
            return Err(Failure::Exhausted { steps: self.steps });
        }
        self.steps += 1;
        Ok(())
    }
}
