//! Periodic task scheduling.
//!
//! Tasks are kept in a min-heap ordered by their due time, so a tick only
//! touches the tasks that are actually due. When a budget limits how many
//! tasks may run in one tick, the ones that have waited longest past their
//! due time go first and the rest keep their place in the queue, which rules
//! out starvation no matter how many tasks share a cadence.
//!
//! All bookkeeping lives behind one mutex that is never held while a callback
//! runs. A tick snapshots the due set first and re-checks liveness before each
//! call, so callbacks may freely register or deregister tasks (including
//! themselves) on the scheduler that is running them.

use crate::schedule::callback::invoke_guarded;
use crate::schedule::task_registry::TaskRegistry;
use crate::schedule::{RegistrationError, TaskContext, TaskDescriptor, TaskFn, TaskKey};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Limits on how much work one tick may do. Unlimited by default.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TickBudget {
    /// Maximum number of task callbacks per tick. Zero is treated as one.
    pub max_runs: Option<usize>,
    /// Wall-clock budget per tick. The first due task always runs.
    pub max_time: Option<Duration>,
}

impl TickBudget {
    pub const UNLIMITED: Self = Self {
        max_runs: None,
        max_time: None,
    };
}

/// Outcome of one `run_due_tasks` call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Callbacks that completed successfully.
    pub ran: usize,
    /// Callbacks that returned an error or panicked.
    pub failed: usize,
    /// Due tasks pushed to a later tick by the budget.
    pub deferred: usize,
}

/// Scheduler that runs registered tasks at their desired interval.
pub struct IntervalScheduler {
    state: Mutex<SchedulerState>,
    budget: TickBudget,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::with_budget(TickBudget::UNLIMITED)
    }

    pub fn with_budget(mut budget: TickBudget) -> Self {
        budget.max_runs = budget.max_runs.map(|max| max.max(1));
        Self {
            state: Mutex::new(SchedulerState {
                registry: TaskRegistry::new(),
                queue: BinaryHeap::new(),
                next_seq: 0,
                last_now: Duration::ZERO,
            }),
            budget,
        }
    }

    pub fn budget(&self) -> TickBudget {
        self.budget
    }

    /// Add a task. It becomes eligible at the next `run_due_tasks` call.
    pub fn register(&self, descriptor: TaskDescriptor) -> Result<(), RegistrationError> {
        let key = descriptor.key();
        let interval = descriptor.desired_interval();

        let mut guard = self.lock();
        let state = &mut *guard;
        let due = state.last_now;
        let generation = state.registry.insert(descriptor, due)?;
        state.push(key, generation, due);

        tracing::debug!(task = %key, ?interval, "task scheduled");
        Ok(())
    }

    /// Remove a task. Returns whether it was registered; removing an unknown key is a no-op.
    pub fn deregister(&self, key: TaskKey) -> bool {
        // Queue entries are dropped lazily when they surface.
        let removed = self.lock().registry.remove(key).is_some();
        if removed {
            tracing::debug!(task = %key, "task unscheduled");
        }
        removed
    }

    /// Remove every task.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.registry.clear();
        state.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: TaskKey) -> bool {
        self.lock().registry.contains(key)
    }

    /// How many times the task has been invoked, or `None` if it is not registered.
    pub fn run_count(&self, key: TaskKey) -> Option<u64> {
        self.lock().registry.get(key).map(|record| record.run_count)
    }

    /// Scheduler time at which the task is next due.
    pub fn next_due(&self, key: TaskKey) -> Option<Duration> {
        self.lock().registry.get(key).map(|record| record.next_due)
    }

    /// Run every task that is due at `now`.
    ///
    /// Tasks flagged `only_when_active` stay queued while `is_active` is false and
    /// run as soon as the context becomes active again. A task runs only once its
    /// interval has fully elapsed since its previous run.
    pub fn run_due_tasks(&self, now: Duration, is_active: bool) -> TickReport {
        let mut report = TickReport::default();
        let batch = self.collect_due(now, is_active, &mut report);
        tracing::trace!(?now, due = batch.len(), "running due tasks");

        let started = Instant::now();
        let mut pending = batch.into_iter();
        while let Some(task) = pending.next() {
            let over_time = self
                .budget
                .max_time
                .is_some_and(|limit| report.ran + report.failed > 0 && started.elapsed() >= limit);
            if over_time {
                let mut state = self.lock();
                for task in std::iter::once(task).chain(pending.by_ref()) {
                    if state.registry.live(task.key, task.generation).is_some() {
                        state.queue.push(Reverse(task.entry()));
                        report.deferred += 1;
                    }
                }
                break;
            }

            // An earlier callback of this tick may have removed it.
            if self.lock().registry.live(task.key, task.generation).is_none() {
                continue;
            }

            let context = TaskContext {
                key: task.key,
                now,
                last_run: task.last_run,
                elapsed: now.saturating_sub(task.anchor),
            };
            match invoke_guarded(|| (task.function)(&context)) {
                Ok(()) => report.ran += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::error!(task = %task.key, %error, "scheduled task failed");
                }
            }

            self.reschedule(&task, now);
        }

        report
    }

    fn collect_due(&self, now: Duration, is_active: bool, report: &mut TickReport) -> Vec<DueTask> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.last_now = state.last_now.max(now);

        let mut batch = Vec::new();
        let mut held_back = Vec::new();
        while let Some(&Reverse(entry)) = state.queue.peek() {
            if entry.due > now {
                break;
            }
            state.queue.pop();

            let Some(record) = state.registry.live(entry.key, entry.generation) else {
                continue;
            };
            if record.descriptor.is_only_when_active() && !is_active {
                held_back.push(entry);
                continue;
            }
            if self.budget.max_runs.is_some_and(|max| batch.len() >= max) {
                held_back.push(entry);
                report.deferred += 1;
                continue;
            }

            batch.push(DueTask {
                key: entry.key,
                generation: entry.generation,
                due: entry.due,
                seq: entry.seq,
                function: record.descriptor.function().clone(),
                last_run: record.last_run,
                anchor: record.anchor(),
            });
        }

        state
            .queue
            .extend(held_back.into_iter().map(Reverse));
        batch
    }

    fn reschedule(&self, task: &DueTask, now: Duration) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(record) = state.registry.live_mut(task.key, task.generation) else {
            return;
        };

        let due = now + record.descriptor.desired_interval();
        record.last_run = Some(now);
        record.run_count += 1;
        record.next_due = due;
        state.push(task.key, task.generation, due);
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        // Callbacks never run under this lock, so a poisoned guard holds consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

struct SchedulerState {
    registry: TaskRegistry,
    queue: BinaryHeap<Reverse<DueEntry>>,
    next_seq: u64,
    last_now: Duration,
}

impl SchedulerState {
    fn push(&mut self, key: TaskKey, generation: u64, due: Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(DueEntry {
            due,
            seq,
            key,
            generation,
        }));
    }
}

/// Queue entry; ordered by due time, then by insertion order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct DueEntry {
    due: Duration,
    seq: u64,
    key: TaskKey,
    generation: u64,
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Snapshot of a due task taken before any callback of the tick runs.
struct DueTask {
    key: TaskKey,
    generation: u64,
    due: Duration,
    seq: u64,
    function: TaskFn,
    last_run: Option<Duration>,
    anchor: Duration,
}

impl DueTask {
    fn entry(&self) -> DueEntry {
        DueEntry {
            due: self.due,
            seq: self.seq,
            key: self.key,
            generation: self.generation,
        }
    }
}
