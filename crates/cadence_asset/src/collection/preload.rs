//! Collection resource: incremental, weighted preloading of a descriptor's
//! entries.
//!
//! `preload_resources(n)` turns up to `n` not-yet-queued entries into live
//! handles per call, so a large collection can be queued across frames.
//! Every entry is queued exactly once; entries that cannot be loaded become
//! invalid placeholders and are never retried. `loading_status` polls the
//! resource manager and reports byte-weighted progress.

use super::watchdog::PreloadWatchdog;
use super::{CollectionDescriptor, CollectionEntry, DescriptorError};
use crate::{AssetServices, LoadingState, ResourceHandle};
use std::io::Read;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Largest progress value reported while anything is still outstanding.
const MAX_UNFINISHED_PROGRESS: f32 = 1.0 - f32::EPSILON;

/// Result of one progress check.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PreloadStatus {
    pub finished: bool,
    /// In `[0, 1]`; exactly `1.0` only when `finished`.
    pub progress: f32,
}

impl PreloadStatus {
    pub const DONE: Self = Self {
        finished: true,
        progress: 1.0,
    };
}

#[derive(Debug)]
struct PreloadState {
    descriptor: CollectionDescriptor,
    /// Parallel to `descriptor.entries`; never longer.
    queued: Vec<ResourceHandle>,
    content: LoadingState,
}

impl PreloadState {
    fn empty() -> Self {
        Self {
            descriptor: CollectionDescriptor::default(),
            queued: Vec::new(),
            content: LoadingState::Unrequested,
        }
    }
}

/// Lock order is `names` before `state`. The name registry is only touched
/// while `names` is held and `state` is not.
pub struct CollectionResource {
    services: AssetServices,
    state: Mutex<PreloadState>,
    /// Whether display names are currently published.
    names: Mutex<bool>,
}

impl CollectionResource {
    /// A collection with no content yet.
    pub fn new(services: AssetServices) -> Self {
        Self {
            services,
            state: Mutex::new(PreloadState::empty()),
            names: Mutex::new(false),
        }
    }

    pub fn from_descriptor(services: AssetServices, descriptor: CollectionDescriptor) -> Self {
        let collection = Self::new(services);
        collection.create_from_descriptor(descriptor);
        collection
    }

    /// Replace the content with `descriptor`, dropping any previous preload state.
    pub fn create_from_descriptor(&self, descriptor: CollectionDescriptor) {
        self.unload();
        let mut state = self.lock();
        tracing::debug!(entries = descriptor.len(), "collection content created");
        state.descriptor = descriptor;
        state.content = LoadingState::Loaded;
    }

    /// Load content from a stream. `None` means the collection's data does not exist.
    pub fn update_content<R: Read>(
        &self,
        reader: Option<&mut R>,
    ) -> Result<LoadingState, DescriptorError> {
        let Some(reader) = reader else {
            self.unload();
            self.lock().content = LoadingState::LoadedButMissing;
            return Ok(LoadingState::LoadedButMissing);
        };

        let descriptor = CollectionDescriptor::read_from(reader)?;
        self.create_from_descriptor(descriptor);
        Ok(LoadingState::Loaded)
    }

    pub fn content_state(&self) -> LoadingState {
        self.lock().content
    }

    /// Queue up to `max_count` more entries. Returns whether entries remain unqueued.
    pub fn preload_resources(&self, max_count: usize) -> bool {
        let mut guard = self.lock();
        let PreloadState {
            descriptor, queued, ..
        } = &mut *guard;

        let total = descriptor.entries.len();
        // Checked before touching `queued`: a fully queued collection must keep its handles.
        if queued.len() == total {
            return false;
        }

        let start = queued.len();
        let end = start + max_count.min(total - start);
        if queued.capacity() < total {
            queued.reserve_exact(total - queued.len());
        }
        for entry in &descriptor.entries[start..end] {
            queued.push(self.queue_entry(entry));
        }

        tracing::trace!(queued = queued.len(), total, "collection preload pass");
        queued.len() < total
    }

    pub fn preload_all(&self) -> bool {
        self.preload_resources(usize::MAX)
    }

    fn queue_entry(&self, entry: &CollectionEntry) -> ResourceHandle {
        if entry.asset_type.is_empty() {
            tracing::error!(
                resource_id = %entry.resource_id,
                "collection entry has no asset type and cannot be loaded"
            );
            return ResourceHandle::INVALID;
        }

        let Some(kind) = self.services.kinds.find(&entry.asset_type) else {
            tracing::warn!(
                asset_type = %entry.asset_type,
                resource_id = %entry.resource_id,
                "unknown asset type in collection"
            );
            return ResourceHandle::INVALID;
        };

        if entry.resource_id.is_empty() {
            tracing::error!(asset_type = %entry.asset_type, "collection entry has an empty resource id");
            return ResourceHandle::INVALID;
        }

        let handle = kind.load(&entry.resource_id);
        if handle.is_valid() {
            self.services.manager.preload(handle);
        } else {
            tracing::warn!(
                asset_type = %entry.asset_type,
                resource_id = %entry.resource_id,
                "resource could not be resolved"
            );
        }
        handle
    }

    /// Poll load states and compute weighted progress.
    ///
    /// Each valid queued entry weighs `max(byte_size, 1)`. Loaded and
    /// loaded-but-missing entries count as done; loading and unrequested
    /// ones count as outstanding, as does every entry not queued yet.
    /// Invalid placeholders weigh nothing. Up to three unrequested entries
    /// get their preload re-issued per call.
    pub fn loading_status(&self) -> PreloadStatus {
        let state = self.lock();
        let entries = &state.descriptor.entries;
        if entries.is_empty() {
            return PreloadStatus::DONE;
        }

        let manager = self.services.manager.as_ref();
        let mut watchdog = PreloadWatchdog::new(manager);
        let mut done: u128 = 0;
        let mut outstanding: u128 = 0;

        for (entry, handle) in entries.iter().zip(&state.queued) {
            if !handle.is_valid() {
                continue;
            }
            let weight = entry.weight() as u128;
            match manager.loading_state(*handle) {
                state if state.is_finished() => done += weight,
                LoadingState::Unrequested => {
                    outstanding += weight;
                    watchdog.poke(*handle, &entry.resource_id);
                }
                LoadingState::Invalid => {}
                _ => outstanding += weight,
            }
        }

        let unqueued: u128 = entries[state.queued.len()..]
            .iter()
            .map(|entry| entry.weight() as u128)
            .sum();

        let finished = unqueued == 0 && outstanding == 0;
        if finished {
            return PreloadStatus::DONE;
        }

        let fraction = done as f64 / (done + outstanding + unqueued) as f64;
        PreloadStatus {
            finished,
            progress: (fraction as f32).min(MAX_UNFINISHED_PROGRESS),
        }
    }

    pub fn is_loading_finished(&self) -> bool {
        self.loading_status().finished
    }

    /// Publish display names to the name registry. No-op if already published.
    pub fn register_names(&self) {
        let mut registered = self.lock_names();
        if *registered {
            return;
        }
        let names = self.display_names();
        tracing::debug!(count = names.len(), "registering collection names");
        self.services.names.register_all(names);
        *registered = true;
    }

    /// Remove published display names. No-op if none are published.
    pub fn unregister_names(&self) {
        let mut registered = self.lock_names();
        self.unregister_names_locked(&mut registered);
    }

    fn unregister_names_locked(&self, registered: &mut bool) {
        if !*registered {
            return;
        }
        let names: Vec<String> = self
            .display_names()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        tracing::debug!(count = names.len(), "unregistering collection names");
        self.services.names.unregister_all(names);
        *registered = false;
    }

    /// `(display name, resource id)` pairs worth publishing.
    fn display_names(&self) -> Vec<(String, String)> {
        self.lock()
            .descriptor
            .entries
            .iter()
            .filter(|e| !e.display_name.is_empty() && !e.resource_id.is_empty())
            .map(|e| (e.display_name.clone(), e.resource_id.clone()))
            .collect()
    }

    /// Queue every entry and optionally publish display names.
    pub fn activate(&self, register_names: bool) {
        self.preload_all();
        if register_names {
            self.register_names();
        }
    }

    /// Drop all preload state and content. Names are unregistered first.
    pub fn unload(&self) {
        // Held across the clear so no registration lands between the two.
        let mut registered = self.lock_names();
        self.unregister_names_locked(&mut registered);
        let released = {
            let mut state = self.lock();
            let released = state.queued.len();
            *state = PreloadState::empty();
            released
        };
        drop(registered);
        if released > 0 {
            tracing::debug!(released, "collection unloaded");
        }
    }

    /// Approximate heap footprint of the preload state.
    pub fn memory_usage(&self) -> usize {
        let state = self.lock();
        let strings: usize = state
            .descriptor
            .entries
            .iter()
            .map(|e| e.asset_type.capacity() + e.display_name.capacity() + e.resource_id.capacity())
            .sum();
        mem::size_of::<Self>()
            + state.queued.capacity() * mem::size_of::<ResourceHandle>()
            + state.descriptor.entries.capacity() * mem::size_of::<CollectionEntry>()
            + strings
    }

    pub fn entry_count(&self) -> usize {
        self.lock().descriptor.entries.len()
    }

    pub fn queued_count(&self) -> usize {
        self.lock().queued.len()
    }

    pub fn queued_handles(&self) -> Vec<ResourceHandle> {
        self.lock().queued.clone()
    }

    pub fn descriptor(&self) -> CollectionDescriptor {
        self.lock().descriptor.clone()
    }

    pub fn names_registered(&self) -> bool {
        *self.lock_names()
    }

    #[cfg(test)]
    fn queued_storage(&self) -> (*const ResourceHandle, usize) {
        let state = self.lock();
        (state.queued.as_ptr(), state.queued.capacity())
    }

    fn lock(&self) -> MutexGuard<'_, PreloadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_names(&self) -> MutexGuard<'_, bool> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CollectionResource {
    fn drop(&mut self) {
        self.unregister_names();
    }
}

impl std::fmt::Debug for CollectionResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names_registered = self.names_registered();
        let state = self.lock();
        f.debug_struct("CollectionResource")
            .field("entries", &state.descriptor.entries.len())
            .field("queued", &state.queued.len())
            .field("names_registered", &names_registered)
            .field("content", &state.content)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::watchdog::MAX_POKES_PER_CHECK;
    use crate::{MemoryResourceManager, NameRegistry, ResourceKindRegistry, ResourceManager};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing::{Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Counts events at one level.
    struct LevelCounter {
        level: Level,
        count: Arc<AtomicUsize>,
    }

    impl<S: Subscriber> Layer<S> for LevelCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == self.level {
                self.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn count_events<R>(level: Level, f: impl FnOnce() -> R) -> (R, usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(LevelCounter {
            level,
            count: count.clone(),
        });
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, count.load(Ordering::Relaxed))
    }

    fn setup(kinds: &[&str]) -> (AssetServices, MemoryResourceManager) {
        let manager = MemoryResourceManager::new();
        let registry = ResourceKindRegistry::new();
        for kind in kinds {
            registry.register(manager.kind(*kind));
        }
        let services = AssetServices::new(
            Arc::new(registry),
            Arc::new(manager.clone()),
            Arc::new(NameRegistry::new()),
        );
        (services, manager)
    }

    fn meshes(sizes: &[u64]) -> CollectionDescriptor {
        CollectionDescriptor::new(
            sizes
                .iter()
                .enumerate()
                .map(|(i, size)| {
                    CollectionEntry::new("Mesh", format!("Meshes/{i}.mesh")).with_byte_size(*size)
                })
                .collect(),
        )
    }

    #[test]
    fn second_full_preload_keeps_handles() {
        let (services, manager) = setup(&["Mesh"]);
        let collection = CollectionResource::from_descriptor(services, meshes(&[1, 2, 3, 4, 5]));

        assert!(!collection.preload_all());
        assert_eq!(collection.queued_count(), 5);
        let storage = collection.queued_storage();
        let handles = collection.queued_handles();
        let requests = manager.preload_requests();

        assert!(!collection.preload_all());
        assert_eq!(collection.queued_storage(), storage);
        assert_eq!(collection.queued_handles(), handles);
        assert_eq!(manager.preload_requests(), requests);
    }

    #[test]
    fn incremental_preload_resumes() {
        let (services, _manager) = setup(&["Mesh"]);
        let collection = CollectionResource::from_descriptor(services, meshes(&[0; 5]));

        assert!(collection.preload_resources(2));
        assert_eq!(collection.queued_count(), 2);
        assert!(collection.preload_resources(2));
        assert_eq!(collection.queued_count(), 4);
        assert!(!collection.preload_resources(2));
        assert_eq!(collection.queued_count(), 5);
        assert!(!collection.preload_resources(0));
    }

    #[test]
    fn weighted_progress_is_monotonic() {
        let (services, manager) = setup(&["Mesh"]);
        let collection = CollectionResource::from_descriptor(services, meshes(&[100, 1, 0, 50]));

        let mut samples = vec![collection.loading_status()];
        for _ in 0..4 {
            collection.preload_resources(1);
            samples.push(collection.loading_status());
            assert_eq!(manager.pump(1), 1);
            samples.push(collection.loading_status());
        }

        for pair in samples.windows(2) {
            assert!(pair[0].progress <= pair[1].progress, "{samples:?}");
        }
        let (last, rest) = samples.split_last().unwrap();
        assert_eq!(*last, PreloadStatus::DONE);
        assert!(rest.iter().all(|s| !s.finished && s.progress < 1.0));
        assert!((samples[2].progress - 100.0 / 152.0).abs() < 1e-6);
    }

    #[test]
    fn queue_everything_then_load() {
        let (services, manager) = setup(&["Mesh"]);
        let collection = CollectionResource::from_descriptor(services, meshes(&[100, 1, 0, 50]));
        manager.mark_missing("Meshes/3.mesh");
        collection.preload_all();

        let mut last = collection.loading_status().progress;
        assert_eq!(last, 0.0);
        while manager.pump(1) > 0 {
            let status = collection.loading_status();
            assert!(status.progress >= last);
            last = status.progress;
        }
        assert!(collection.is_loading_finished());
    }

    #[test]
    fn empty_collection_is_done() {
        let (services, _manager) = setup(&[]);
        let collection = CollectionResource::new(services);
        assert!(!collection.preload_all());
        assert_eq!(collection.loading_status(), PreloadStatus::DONE);
    }

    #[test]
    fn bad_entries_logged_once_and_never_retried() {
        let (services, manager) = setup(&["Mesh"]);
        let collection = CollectionResource::from_descriptor(
            services,
            CollectionDescriptor::new(vec![
                CollectionEntry::new("", "orphan.bin"),
                CollectionEntry::new("Mesh", "a.mesh"),
                CollectionEntry::new("Hologram", "b.holo"),
            ]),
        );

        let (_, errors) = count_events(Level::ERROR, || {
            collection.preload_resources(1);
            collection.preload_resources(1);
            collection.preload_all();
            collection.preload_all();
        });
        assert_eq!(errors, 1);
        assert_eq!(collection.queued_count(), 3);

        let handles = collection.queued_handles();
        assert!(!handles[0].is_valid());
        assert!(handles[1].is_valid());
        assert!(!handles[2].is_valid());

        manager.pump_all();
        assert!(collection.is_loading_finished());
    }

    #[test]
    fn unknown_asset_type_warns() {
        let (services, _manager) = setup(&[]);
        let collection = CollectionResource::from_descriptor(
            services,
            CollectionDescriptor::new(vec![CollectionEntry::new("Hologram", "b.holo")]),
        );
        let (_, warnings) = count_events(Level::WARN, || collection.preload_all());
        assert_eq!(warnings, 1);
        assert!(collection.is_loading_finished());
    }

    #[test]
    fn watchdog_pokes_at_most_three_per_check() {
        let (services, manager) = setup(&["Mesh"]);
        let collection = CollectionResource::from_descriptor(services, meshes(&[10; 5]));
        collection.preload_all();
        for handle in collection.queued_handles() {
            manager.evict(handle);
        }
        let before = manager.preload_requests();

        let (status, warnings) = count_events(Level::WARN, || collection.loading_status());
        assert!(!status.finished);
        assert_eq!(warnings, MAX_POKES_PER_CHECK);
        assert_eq!(manager.preload_requests() - before, MAX_POKES_PER_CHECK);

        collection.loading_status();
        assert_eq!(manager.preload_requests() - before, 5);

        manager.pump_all();
        assert!(collection.is_loading_finished());
    }

    #[test]
    fn names_are_idempotent() {
        let (services, _manager) = setup(&["Texture2D"]);
        let names = services.names.clone();
        let collection = CollectionResource::from_descriptor(
            services,
            CollectionDescriptor::new(vec![
                CollectionEntry::new("Texture2D", "stone.dds").with_display_name("Stone"),
                CollectionEntry::new("Texture2D", "grass.dds"),
            ]),
        );

        collection.register_names();
        collection.register_names();
        assert_eq!(names.len(), 1);
        assert_eq!(names.resolve("Stone").as_deref(), Some("stone.dds"));

        collection.unregister_names();
        collection.unregister_names();
        assert!(names.is_empty());

        collection.activate(true);
        assert!(collection.names_registered());
        drop(collection);
        assert!(names.is_empty());
    }

    #[test]
    fn unload_clears_state_and_names() {
        let (services, manager) = setup(&["Mesh"]);
        let names = services.names.clone();
        let mut descriptor = meshes(&[1, 2]);
        descriptor.entries[0].display_name = "Rock".into();
        descriptor.entries[1].display_name = "Tree".into();
        let collection = CollectionResource::from_descriptor(services, descriptor);
        collection.activate(true);
        assert!(collection.memory_usage() > 0);
        assert_eq!(names.len(), 2);

        collection.unload();
        assert_eq!(collection.queued_count(), 0);
        assert_eq!(collection.entry_count(), 0);
        assert_eq!(collection.content_state(), LoadingState::Unrequested);
        assert!(names.is_empty());
        assert_eq!(manager.loading_state(manager.find("Meshes/0.mesh")), LoadingState::Loading);
    }

    #[test]
    fn racing_name_toggles_leave_registry_consistent() {
        let (services, _manager) = setup(&["Mesh"]);
        let names = services.names.clone();
        let mut descriptor = meshes(&[1, 2, 3]);
        for (i, entry) in descriptor.entries.iter_mut().enumerate() {
            entry.display_name = format!("Rock{i}");
        }
        let collection = Arc::new(CollectionResource::from_descriptor(services, descriptor));

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let collection = collection.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        if (i + worker) % 2 == 0 {
                            collection.register_names();
                        } else {
                            collection.unregister_names();
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(collection.names_registered(), names.len() == 3);
        collection.unregister_names();
        assert!(names.is_empty());
    }

    #[test]
    fn registration_racing_unload_leaves_no_names() {
        let (services, _manager) = setup(&["Mesh"]);
        let names = services.names.clone();
        let mut descriptor = meshes(&[1, 2]);
        descriptor.entries[0].display_name = "Rock".into();
        descriptor.entries[1].display_name = "Tree".into();
        let collection = Arc::new(CollectionResource::new(services));

        for _ in 0..200 {
            collection.create_from_descriptor(descriptor.clone());
            let registrar = {
                let collection = collection.clone();
                std::thread::spawn(move || collection.register_names())
            };
            collection.unload();
            registrar.join().unwrap();

            // Either the unload removed the names or the registration saw no content.
            assert!(names.is_empty());
            collection.unregister_names();
        }
    }

    #[test]
    fn update_content_reads_stream() {
        let (services, _manager) = setup(&["Mesh"]);
        let collection = CollectionResource::new(services);

        let bytes = meshes(&[7, 8]).to_bytes().unwrap();
        let state = collection.update_content(Some(&mut bytes.as_slice())).unwrap();
        assert_eq!(state, LoadingState::Loaded);
        assert_eq!(collection.entry_count(), 2);

        let state = collection.update_content::<&[u8]>(None).unwrap();
        assert_eq!(state, LoadingState::LoadedButMissing);
        assert_eq!(collection.entry_count(), 0);

        assert!(collection
            .update_content(Some(&mut [9u8, 9].as_slice()))
            .is_err());
    }
}
