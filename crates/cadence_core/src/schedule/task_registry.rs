use crate::schedule::{RegistrationError, TaskDescriptor, TaskKey};
use std::collections::HashMap;
use std::time::Duration;

/// Keyed storage for scheduled tasks and their run bookkeeping.
///
/// Every insertion gets a fresh generation so queue entries left behind by a
/// removed task can never be mistaken for a later task reusing the same key.
pub(crate) struct TaskRegistry {
    tasks: HashMap<TaskKey, TaskRecord>,
    next_generation: u64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            next_generation: 1,
        }
    }

    pub fn insert(
        &mut self,
        descriptor: TaskDescriptor,
        registered_at: Duration,
    ) -> Result<u64, RegistrationError> {
        let key = descriptor.key();
        if self.tasks.contains_key(&key) {
            return Err(RegistrationError::DuplicateTask { key });
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.tasks.insert(
            key,
            TaskRecord {
                descriptor,
                generation,
                registered_at,
                next_due: registered_at,
                last_run: None,
                run_count: 0,
            },
        );
        Ok(generation)
    }

    pub fn remove(&mut self, key: TaskKey) -> Option<TaskRecord> {
        self.tasks.remove(&key)
    }

    pub fn get(&self, key: TaskKey) -> Option<&TaskRecord> {
        self.tasks.get(&key)
    }

    /// Record for `key` only if it is still the same registration.
    pub fn live(&self, key: TaskKey, generation: u64) -> Option<&TaskRecord> {
        self.tasks
            .get(&key)
            .filter(|record| record.generation == generation)
    }

    pub fn live_mut(&mut self, key: TaskKey, generation: u64) -> Option<&mut TaskRecord> {
        self.tasks
            .get_mut(&key)
            .filter(|record| record.generation == generation)
    }

    pub fn contains(&self, key: TaskKey) -> bool {
        self.tasks.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

pub(crate) struct TaskRecord {
    pub descriptor: TaskDescriptor,
    pub generation: u64,
    pub registered_at: Duration,
    pub next_due: Duration,
    pub last_run: Option<Duration>,
    pub run_count: u64,
}

impl TaskRecord {
    /// Reference point for the next interval: the last run, or registration time.
    pub fn anchor(&self) -> Duration {
        self.last_run.unwrap_or(self.registered_at)
    }
}
