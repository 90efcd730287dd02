use crate::schedule::{CallbackResult, TaskKey, UpdatePhase};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Shared update callback, invoked with the component range it must process.
pub type UpdateFn = Arc<dyn Fn(&UpdateContext) -> CallbackResult + Send + Sync>;

/// Component range handed to one invocation of an update function.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpdateContext {
    pub phase: UpdatePhase,
    /// Index of the first component to process.
    pub first: usize,
    /// Number of components to process.
    pub count: usize,
}

impl UpdateContext {
    pub fn range(&self) -> Range<usize> {
        self.first..self.first + self.count
    }
}

/// Registration record for a phase-bound update function.
#[derive(Clone)]
pub struct UpdateDescriptor {
    key: TaskKey,
    name: String,
    function: UpdateFn,
    depends_on: Vec<String>,
    phase: UpdatePhase,
    only_when_active: bool,
    batch_size: usize,
    priority: f32,
}

impl UpdateDescriptor {
    /// Create a descriptor with the provided key and unique (per phase) name.
    pub fn new<F>(key: TaskKey, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&UpdateContext) -> CallbackResult + Send + Sync + 'static,
    {
        Self {
            key,
            name: name.into(),
            function: Arc::new(function),
            depends_on: Vec::new(),
            phase: UpdatePhase::default(),
            only_when_active: false,
            batch_size: 0,
            priority: 0.0,
        }
    }

    /// Phase in which the function runs.
    pub fn phase(mut self, phase: UpdatePhase) -> Self {
        self.phase = phase;
        self
    }

    /// Replace the set of functions (by name, same phase) that must run first.
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self.depends_on.sort_unstable();
        self.depends_on.dedup();
        self
    }

    /// Only call the function while the owning context is active.
    pub fn only_when_active(mut self, only_when_active: bool) -> Self {
        self.only_when_active = only_when_active;
        self
    }

    /// 0 calls the function once over the whole range; >0 splits the range
    /// into chunks of roughly this size (Parallel phase only).
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Higher priority runs earlier among functions not ordered by dependencies.
    pub fn priority(mut self, priority: f32) -> Self {
        self.priority = priority;
        self
    }

    pub fn key(&self) -> TaskKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn update_phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn is_only_when_active(&self) -> bool {
        self.only_when_active
    }

    pub fn priority_value(&self) -> f32 {
        self.priority
    }

    pub(crate) fn function(&self) -> &UpdateFn {
        &self.function
    }

    /// Split `range` into the invocations this descriptor needs in `phase`.
    pub(crate) fn chunks(&self, phase: UpdatePhase, range: Range<usize>) -> Vec<UpdateContext> {
        let total = range.len();
        if phase != UpdatePhase::Parallel || self.batch_size == 0 || total <= self.batch_size {
            return vec![UpdateContext {
                phase,
                first: range.start,
                count: total,
            }];
        }

        // Spread the remainder so chunks stay close to the requested size.
        let chunk_count = total.div_ceil(self.batch_size);
        let base = total / chunk_count;
        let extra = total % chunk_count;
        let mut first = range.start;
        (0..chunk_count)
            .map(|i| {
                let count = base + usize::from(i < extra);
                let context = UpdateContext { phase, first, count };
                first += count;
                context
            })
            .collect()
    }
}

impl fmt::Debug for UpdateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateDescriptor")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("phase", &self.phase)
            .field("only_when_active", &self.only_when_active)
            .field("batch_size", &self.batch_size)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
