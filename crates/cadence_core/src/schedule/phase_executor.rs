//! Phase-ordered execution of registered update functions.
//!
//! Each phase keeps its own list of descriptors and a cached execution plan.
//! The plan is resolved when a function is registered, so a dependency cycle
//! is rejected before anything runs, and is dropped again when a function is
//! removed. Running a phase snapshots the plan and never holds the lock while
//! user code runs.

use crate::schedule::callback::invoke_guarded;
use crate::schedule::dependency_order::{resolve_order, OrderNode, PhaseOrder};
use crate::schedule::{RegistrationError, TaskKey, UpdateContext, UpdateDescriptor, UpdatePhase};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of running one phase.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PhaseReport {
    /// Functions whose every invocation succeeded.
    pub ran: usize,
    /// Functions with at least one failed invocation.
    pub failed: usize,
    /// Functions skipped because the context is not active.
    pub skipped_inactive: usize,
    /// Functions skipped because a dependency failed this tick.
    pub skipped_dependency: usize,
}

/// Runs update functions phase by phase, in dependency and priority order.
pub struct PhaseExecutor {
    state: Mutex<ExecutorState>,
    pool: Option<ThreadPool>,
}

impl PhaseExecutor {
    /// Executor whose Parallel phase runs on the global rayon pool.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExecutorState::default()),
            pool: None,
        }
    }

    /// Executor whose Parallel phase runs on a dedicated pool.
    pub fn with_thread_pool(pool: ThreadPool) -> Self {
        Self {
            state: Mutex::new(ExecutorState::default()),
            pool: Some(pool),
        }
    }

    /// Executor with a dedicated pool of `threads` workers (0 picks rayon's default).
    pub fn with_worker_threads(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("cadence-phase-{index}"))
            .build()?;
        Ok(Self::with_thread_pool(pool))
    }

    /// Register an update function.
    ///
    /// Fails without changing anything if the key is already registered in any
    /// phase, the name is taken in the target phase, or the new dependency
    /// edges would close a cycle.
    pub fn register(&self, descriptor: UpdateDescriptor) -> Result<(), RegistrationError> {
        let key = descriptor.key();
        let phase = descriptor.update_phase();
        if descriptor.name().is_empty() {
            return Err(RegistrationError::EmptyName { key });
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(existing) = state.phase_of(key) {
            return Err(RegistrationError::DuplicateKey {
                key,
                phase: existing,
            });
        }

        let seq = state.next_seq;
        let table = &mut state.phases[phase.index()];
        if table.entries.iter().any(|e| e.descriptor.name() == descriptor.name()) {
            return Err(RegistrationError::DuplicateName {
                name: descriptor.name().to_string(),
                phase,
            });
        }

        let name = descriptor.name().to_string();
        table.entries.push(Registered { descriptor, seq });
        match table.resolve() {
            Ok(plan) => {
                table.plan = Some(plan);
                state.next_seq += 1;
                tracing::debug!(function = %name, %phase, %key, "update function registered");
                Ok(())
            }
            Err(names) => {
                table.entries.pop();
                tracing::error!(function = %name, %phase, cycle = ?names, "dependency cycle rejected");
                Err(RegistrationError::DependencyCycle { phase, names })
            }
        }
    }

    /// Remove an update function by key. Removing an unknown key is a no-op.
    pub fn deregister(&self, key: TaskKey) -> bool {
        let mut state = self.lock();
        for table in &mut state.phases {
            if let Some(position) = table.entries.iter().position(|e| e.descriptor.key() == key) {
                let removed = table.entries.remove(position);
                table.plan = None;
                tracing::debug!(function = removed.descriptor.name(), %key, "update function deregistered");
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.lock().phases.iter().map(|t| t.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: TaskKey) -> bool {
        self.lock().phase_of(key).is_some()
    }

    /// Names of the functions of `phase` in sequential execution order.
    pub fn execution_order(&self, phase: UpdatePhase) -> Vec<String> {
        match self.plan(phase) {
            Some(plan) => plan
                .order
                .order
                .iter()
                .map(|&i| plan.functions[i].name().to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Run all four phases in their fixed order over the same component range.
    pub fn run_all_phases(
        &self,
        is_active: bool,
        range: Range<usize>,
    ) -> [PhaseReport; UpdatePhase::COUNT] {
        UpdatePhase::ALL.map(|phase| self.run_phase(phase, is_active, range.clone()))
    }

    /// Run every function registered for `phase` over `range`.
    ///
    /// Sync phases call each function once over the whole range on this thread.
    /// The Parallel phase runs independent functions, and the chunks of batched
    /// functions, concurrently; a function only starts after all chunks of its
    /// dependencies are done, and the call returns once every chunk finished.
    pub fn run_phase(&self, phase: UpdatePhase, is_active: bool, range: Range<usize>) -> PhaseReport {
        let Some(plan) = self.plan(phase) else {
            return PhaseReport::default();
        };
        tracing::trace!(%phase, functions = plan.functions.len(), ?range, "running phase");

        let mut run = PhaseRun::new(&plan, phase, is_active);
        if phase == UpdatePhase::Parallel {
            for level in &plan.order.levels {
                self.run_level(&mut run, level, range.clone());
            }
        } else {
            for &index in &plan.order.order {
                if run.admit(index) {
                    let context = UpdateContext {
                        phase,
                        first: range.start,
                        count: range.len(),
                    };
                    let function = plan.functions[index].function();
                    let outcome = invoke_guarded(|| function(&context));
                    run.finish(index, outcome.map_err(|e| vec![e]));
                }
            }
        }
        run.report
    }

    fn run_level(&self, run: &mut PhaseRun<'_>, level: &[usize], range: Range<usize>) {
        let plan = run.plan;
        let phase = run.phase;
        let jobs: Vec<(usize, UpdateContext)> = level
            .iter()
            .copied()
            .filter(|&index| run.admit(index))
            .flat_map(|index| {
                plan.functions[index]
                    .chunks(phase, range.clone())
                    .into_iter()
                    .map(move |context| (index, context))
            })
            .collect();
        if jobs.is_empty() {
            return;
        }

        let execute = || -> Vec<(usize, Result<(), String>)> {
            jobs.par_iter()
                .map(|(index, context)| {
                    let function = plan.functions[*index].function();
                    (*index, invoke_guarded(|| function(context)))
                })
                .collect()
        };
        let outcomes = match &self.pool {
            Some(pool) => pool.install(execute),
            None => execute(),
        };

        let mut errors: Vec<(usize, Vec<String>)> = Vec::new();
        let mut finished: Vec<usize> = Vec::new();
        for (index, outcome) in outcomes {
            if !finished.contains(&index) {
                finished.push(index);
            }
            if let Err(error) = outcome {
                match errors.iter_mut().find(|(i, _)| *i == index) {
                    Some((_, list)) => list.push(error),
                    None => errors.push((index, vec![error])),
                }
            }
        }
        for index in finished {
            let outcome = match errors.iter().position(|(i, _)| *i == index) {
                Some(position) => Err(errors.swap_remove(position).1),
                None => Ok(()),
            };
            run.finish(index, outcome);
        }
    }

    fn plan(&self, phase: UpdatePhase) -> Option<Arc<PhasePlan>> {
        let mut state = self.lock();
        let table = &mut state.phases[phase.index()];
        if table.plan.is_none() {
            match table.resolve() {
                Ok(plan) => table.plan = Some(plan),
                Err(names) => {
                    // Registration rejects cycles, so this only guards the invariant.
                    tracing::error!(%phase, cycle = ?names, "phase has no valid order");
                    return None;
                }
            }
        }
        table.plan.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ExecutorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PhaseExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct ExecutorState {
    phases: [PhaseTable; UpdatePhase::COUNT],
    next_seq: u64,
}

impl ExecutorState {
    fn phase_of(&self, key: TaskKey) -> Option<UpdatePhase> {
        UpdatePhase::ALL.into_iter().find(|phase| {
            self.phases[phase.index()]
                .entries
                .iter()
                .any(|e| e.descriptor.key() == key)
        })
    }
}

#[derive(Default)]
struct PhaseTable {
    entries: Vec<Registered>,
    plan: Option<Arc<PhasePlan>>,
}

impl PhaseTable {
    fn resolve(&self) -> Result<Arc<PhasePlan>, Vec<String>> {
        let nodes: Vec<OrderNode<'_>> = self
            .entries
            .iter()
            .map(|e| OrderNode {
                name: e.descriptor.name(),
                depends_on: e.descriptor.dependencies(),
                priority: e.descriptor.priority_value(),
                seq: e.seq,
            })
            .collect();
        let order = resolve_order(&nodes).map_err(|cycle| cycle.names)?;
        Ok(Arc::new(PhasePlan {
            functions: self.entries.iter().map(|e| e.descriptor.clone()).collect(),
            order,
        }))
    }
}

struct Registered {
    descriptor: UpdateDescriptor,
    seq: u64,
}

/// Immutable snapshot a phase runs from.
struct PhasePlan {
    functions: Vec<UpdateDescriptor>,
    order: PhaseOrder,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Status {
    Pending,
    Ran,
    Failed,
    SkippedInactive,
    SkippedDependency,
}

/// Per-tick bookkeeping of one phase run.
struct PhaseRun<'a> {
    plan: &'a PhasePlan,
    phase: UpdatePhase,
    is_active: bool,
    status: Vec<Status>,
    report: PhaseReport,
}

impl<'a> PhaseRun<'a> {
    fn new(plan: &'a PhasePlan, phase: UpdatePhase, is_active: bool) -> Self {
        Self {
            plan,
            phase,
            is_active,
            status: vec![Status::Pending; plan.functions.len()],
            report: PhaseReport::default(),
        }
    }

    /// Decide whether `index` may run now; records the skip if not.
    fn admit(&mut self, index: usize) -> bool {
        let plan = self.plan;
        let descriptor = &plan.functions[index];
        if descriptor.is_only_when_active() && !self.is_active {
            self.status[index] = Status::SkippedInactive;
            self.report.skipped_inactive += 1;
            return false;
        }

        let broken = plan.order.dependencies[index].iter().find(|&&parent| {
            matches!(self.status[parent], Status::Failed | Status::SkippedDependency)
        });
        if let Some(&parent) = broken {
            tracing::warn!(
                phase = %self.phase,
                function = descriptor.name(),
                dependency = plan.functions[parent].name(),
                "skipping update function because a dependency failed"
            );
            self.status[index] = Status::SkippedDependency;
            self.report.skipped_dependency += 1;
            return false;
        }
        true
    }

    fn finish(&mut self, index: usize, outcome: Result<(), Vec<String>>) {
        match outcome {
            Ok(()) => {
                self.status[index] = Status::Ran;
                self.report.ran += 1;
            }
            Err(errors) => {
                let plan = self.plan;
                let descriptor = &plan.functions[index];
                for error in &errors {
                    tracing::error!(
                        phase = %self.phase,
                        function = descriptor.name(),
                        key = %descriptor.key(),
                        %error,
                        "update function failed"
                    );
                }
                self.status[index] = Status::Failed;
                self.report.failed += 1;
            }
        }
    }
}
