use crate::schedule::{CallbackResult, TaskKey};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Shared callback invoked when a task comes due.
pub type TaskFn = Arc<dyn Fn(&TaskContext) -> CallbackResult + Send + Sync>;

/// Information handed to a task each time it runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TaskContext {
    pub key: TaskKey,
    /// Scheduler time of the current tick.
    pub now: Duration,
    /// Scheduler time of the previous run, `None` on the first run.
    pub last_run: Option<Duration>,
    /// Time since the previous run (or since registration on the first run).
    pub elapsed: Duration,
}

/// Registration record for a periodic task.
#[derive(Clone)]
pub struct TaskDescriptor {
    key: TaskKey,
    interval: Duration,
    only_when_active: bool,
    function: TaskFn,
}

impl TaskDescriptor {
    /// Create a task that runs every tick.
    pub fn new<F>(key: TaskKey, function: F) -> Self
    where
        F: Fn(&TaskContext) -> CallbackResult + Send + Sync + 'static,
    {
        Self {
            key,
            interval: Duration::ZERO,
            only_when_active: false,
            function: Arc::new(function),
        }
    }

    /// Desired time between two runs. Zero means every tick.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Skip the task while the owning context (e.g. the simulation) is paused.
    pub fn only_when_active(mut self, only_when_active: bool) -> Self {
        self.only_when_active = only_when_active;
        self
    }

    pub fn key(&self) -> TaskKey {
        self.key
    }

    pub fn desired_interval(&self) -> Duration {
        self.interval
    }

    pub fn is_only_when_active(&self) -> bool {
        self.only_when_active
    }

    pub(crate) fn function(&self) -> &TaskFn {
        &self.function
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("key", &self.key)
            .field("interval", &self.interval)
            .field("only_when_active", &self.only_when_active)
            .finish_non_exhaustive()
    }
}
