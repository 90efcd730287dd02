//! Spreads a collection's preload over scheduler ticks.

use super::CollectionResource;
use cadence_core::{IntervalScheduler, RegistrationError, TaskDescriptor, TaskKey};
use std::sync::Arc;
use std::time::Duration;

fn preload_step(collection: &CollectionResource, per_tick: usize) -> bool {
    collection.preload_resources(per_tick)
}

/// Key of the incremental preload task for `collection`.
pub fn incremental_preload_key(collection: &Arc<CollectionResource>) -> TaskKey {
    let step: fn(&CollectionResource, usize) -> bool = preload_step;
    TaskKey::new(step as usize, Arc::as_ptr(collection) as usize)
}

/// Register a task that queues `per_tick` entries each time it runs.
///
/// The task deregisters itself once every entry is queued or the collection
/// is dropped. It holds neither the scheduler nor the collection alive.
pub fn schedule_incremental_preload(
    scheduler: &Arc<IntervalScheduler>,
    collection: &Arc<CollectionResource>,
    per_tick: usize,
    interval: Duration,
) -> Result<TaskKey, RegistrationError> {
    let key = incremental_preload_key(collection);
    let scheduler_ref = Arc::downgrade(scheduler);
    let collection_ref = Arc::downgrade(collection);

    let task = TaskDescriptor::new(key, move |ctx| {
        let more = collection_ref
            .upgrade()
            .is_some_and(|collection| preload_step(&collection, per_tick.max(1)));
        if !more {
            if let Some(scheduler) = scheduler_ref.upgrade() {
                scheduler.deregister(ctx.key);
                tracing::debug!(task = %ctx.key, "incremental preload complete");
            }
        }
        Ok(())
    })
    .interval(interval);

    scheduler.register(task)?;
    Ok(key)
}
