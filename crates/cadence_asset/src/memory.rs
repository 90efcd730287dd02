//! In-process resource manager.
//!
//! Loads are deterministic: a preloaded resource sits in `Loading` until
//! [`MemoryResourceManager::pump`] completes it. Used by the runtime frame
//! loop and by tests that need to step resources through their states.

use crate::{LoadingState, ResourceHandle, ResourceId, ResourceKind, ResourceManager};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Slot {
    resource_id: String,
    asset_type: String,
    state: LoadingState,
}

#[derive(Debug, Default)]
struct ManagerState {
    by_id: HashMap<String, ResourceId>,
    slots: Vec<Slot>,
    queue: VecDeque<ResourceId>,
    missing: HashSet<String>,
    load_requests: usize,
    preload_requests: usize,
}

impl ManagerState {
    fn slot(&self, handle: ResourceHandle) -> Option<&Slot> {
        let id = handle.id()?;
        self.slots.get(id.raw() as usize)
    }

    fn slot_mut(&mut self, handle: ResourceHandle) -> Option<&mut Slot> {
        let id = handle.id()?;
        self.slots.get_mut(id.raw() as usize)
    }
}

/// Shared, cloneable handle to one in-process resource table.
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceManager {
    state: Arc<Mutex<ManagerState>>,
}

impl MemoryResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A resource kind for `asset_type` whose loads land in this manager.
    pub fn kind(&self, asset_type: impl Into<String>) -> Arc<dyn ResourceKind> {
        Arc::new(MemoryKind {
            asset_type: asset_type.into(),
            manager: self.clone(),
        })
    }

    /// Get or create the handle for `resource_id`. New resources start `Unrequested`.
    pub fn load(&self, asset_type: &str, resource_id: &str) -> ResourceHandle {
        if resource_id.is_empty() {
            return ResourceHandle::INVALID;
        }

        let mut state = self.lock();
        state.load_requests += 1;
        if let Some(&id) = state.by_id.get(resource_id) {
            return ResourceHandle::new(id);
        }

        let id = ResourceId::from_raw(state.slots.len() as u64);
        state.slots.push(Slot {
            resource_id: resource_id.to_string(),
            asset_type: asset_type.to_string(),
            state: LoadingState::Unrequested,
        });
        state.by_id.insert(resource_id.to_string(), id);
        ResourceHandle::new(id)
    }

    /// Complete up to `max` queued loads in request order. Returns how many finished.
    pub fn pump(&self, max: usize) -> usize {
        let mut state = self.lock();
        let mut finished = 0;
        while finished < max {
            let Some(id) = state.queue.pop_front() else {
                break;
            };
            let handle = ResourceHandle::new(id);
            let missing = match state.slot(handle) {
                Some(slot) if slot.state == LoadingState::Loading => {
                    state.missing.contains(&slot.resource_id)
                }
                // Stale entry; a later preload re-queues it.
                _ => continue,
            };
            if let Some(slot) = state.slot_mut(handle) {
                slot.state = if missing {
                    LoadingState::LoadedButMissing
                } else {
                    LoadingState::Loaded
                };
                tracing::trace!(resource_id = %slot.resource_id, state = ?slot.state, "resource load completed");
            }
            finished += 1;
        }
        finished
    }

    /// Complete every queued load.
    pub fn pump_all(&self) -> usize {
        self.pump(usize::MAX)
    }

    /// Loads of `resource_id` completed from now on end in `LoadedButMissing`.
    pub fn mark_missing(&self, resource_id: impl Into<String>) {
        self.lock().missing.insert(resource_id.into());
    }

    /// Drop a resource back to `Unrequested`, as an unrelated unload would.
    pub fn evict(&self, handle: ResourceHandle) -> bool {
        let mut state = self.lock();
        let Some(slot) = state.slot_mut(handle) else {
            return false;
        };
        slot.state = LoadingState::Unrequested;
        state.queue.retain(|queued| Some(*queued) != handle.id());
        true
    }

    /// Loads that have been requested but not completed yet.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state
            .queue
            .iter()
            .filter(|id| {
                state
                    .slot(ResourceHandle::new(**id))
                    .is_some_and(|slot| slot.state == LoadingState::Loading)
            })
            .count()
    }

    pub fn find(&self, resource_id: &str) -> ResourceHandle {
        match self.lock().by_id.get(resource_id) {
            Some(&id) => ResourceHandle::new(id),
            None => ResourceHandle::INVALID,
        }
    }

    pub fn asset_type(&self, handle: ResourceHandle) -> Option<String> {
        self.lock().slot(handle).map(|slot| slot.asset_type.clone())
    }

    pub fn resource_count(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn load_requests(&self) -> usize {
        self.lock().load_requests
    }

    /// Number of `preload` calls on valid handles, including repeats.
    pub fn preload_requests(&self) -> usize {
        self.lock().preload_requests
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourceManager for MemoryResourceManager {
    fn loading_state(&self, handle: ResourceHandle) -> LoadingState {
        self.lock()
            .slot(handle)
            .map_or(LoadingState::Invalid, |slot| slot.state)
    }

    fn preload(&self, handle: ResourceHandle) {
        let mut state = self.lock();
        let Some(id) = handle.id() else {
            return;
        };
        let Some(slot) = state.slot_mut(handle) else {
            return;
        };
        if slot.state == LoadingState::Unrequested {
            slot.state = LoadingState::Loading;
            state.queue.push_back(id);
        }
        state.preload_requests += 1;
    }

    fn resource_id(&self, handle: ResourceHandle) -> Option<String> {
        self.lock().slot(handle).map(|slot| slot.resource_id.clone())
    }
}

struct MemoryKind {
    asset_type: String,
    manager: MemoryResourceManager,
}

impl ResourceKind for MemoryKind {
    fn asset_type(&self) -> &str {
        &self.asset_type
    }

    fn load(&self, resource_id: &str) -> ResourceHandle {
        self.manager.load(&self.asset_type, resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_is_idempotent_per_id() {
        let manager = MemoryResourceManager::new();
        let a = manager.load("Mesh", "a.mesh");
        let again = manager.load("Mesh", "a.mesh");
        let b = manager.load("Mesh", "b.mesh");

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(manager.resource_count(), 2);
        assert_eq!(manager.loading_state(a), LoadingState::Unrequested);
        assert_eq!(manager.resource_id(b).as_deref(), Some("b.mesh"));
        assert_eq!(manager.asset_type(b).as_deref(), Some("Mesh"));
    }

    #[test]
    fn empty_id_is_invalid() {
        let manager = MemoryResourceManager::new();
        let handle = manager.load("Mesh", "");
        assert!(!handle.is_valid());
        assert_eq!(manager.loading_state(handle), LoadingState::Invalid);
        manager.preload(handle);
        assert_eq!(manager.preload_requests(), 0);
    }

    #[test]
    fn pump_completes_in_request_order() {
        let manager = MemoryResourceManager::new();
        let a = manager.load("Texture2D", "a.tex");
        let b = manager.load("Texture2D", "b.tex");
        manager.mark_missing("b.tex");

        manager.preload(a);
        manager.preload(b);
        manager.preload(a);
        assert_eq!(manager.preload_requests(), 3);
        assert_eq!(manager.pending(), 2);

        assert_eq!(manager.pump(1), 1);
        assert_eq!(manager.loading_state(a), LoadingState::Loaded);
        assert_eq!(manager.loading_state(b), LoadingState::Loading);

        assert_eq!(manager.pump_all(), 1);
        assert_eq!(manager.loading_state(b), LoadingState::LoadedButMissing);
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn evicted_resource_needs_a_new_request() {
        let manager = MemoryResourceManager::new();
        let a = manager.load("Texture2D", "a.tex");
        manager.preload(a);
        assert!(manager.evict(a));

        assert_eq!(manager.pump_all(), 0);
        assert_eq!(manager.loading_state(a), LoadingState::Unrequested);

        manager.preload(a);
        assert_eq!(manager.pump_all(), 1);
        assert_eq!(manager.loading_state(a), LoadingState::Loaded);
    }

    #[test]
    fn kind_routes_to_manager() {
        let manager = MemoryResourceManager::new();
        let kind = manager.kind("Sound");
        assert_eq!(kind.asset_type(), "Sound");

        let handle = kind.load("boom.wav");
        assert_eq!(manager.find("boom.wav"), handle);
        assert_eq!(manager.load_requests(), 1);
    }
}
