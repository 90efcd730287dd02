//! Contracts between the preloader and the resource system that owns loading.

use crate::{NameRegistry, ResourceKindRegistry};
use std::fmt;
use std::sync::Arc;

/// Opaque id assigned by a resource manager.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typeless reference to a resource, possibly invalid.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResourceHandle(Option<ResourceId>);

impl ResourceHandle {
    pub const INVALID: Self = Self(None);

    pub const fn new(id: ResourceId) -> Self {
        Self(Some(id))
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    pub fn id(&self) -> Option<ResourceId> {
        self.0
    }
}

/// Load state of a resource as reported by its manager.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LoadingState {
    /// Known but never requested (or dropped back to this state).
    Unrequested,
    /// Requested, not finished yet.
    Loading,
    Loaded,
    /// Finished, but the data does not exist; a fallback is used.
    LoadedButMissing,
    Invalid,
}

impl LoadingState {
    /// Whether the resource will make no further loading progress.
    pub fn is_finished(self) -> bool {
        matches!(self, LoadingState::Loaded | LoadingState::LoadedButMissing)
    }
}

/// A loadable kind of resource, looked up by asset type tag.
pub trait ResourceKind: Send + Sync {
    /// Tag this kind is registered under (e.g. `"Texture2D"`).
    fn asset_type(&self) -> &str;

    /// Get (or create) the handle for `resource_id`. Does not start loading.
    fn load(&self, resource_id: &str) -> ResourceHandle;
}

/// Resource system services consumed by the preloader.
pub trait ResourceManager: Send + Sync {
    fn loading_state(&self, handle: ResourceHandle) -> LoadingState;

    /// Queue the resource for loading. Idempotent.
    fn preload(&self, handle: ResourceHandle);

    /// Resource id string the handle was created for.
    fn resource_id(&self, handle: ResourceHandle) -> Option<String>;
}

/// Explicitly wired services a collection needs; shared by every collection.
#[derive(Clone)]
pub struct AssetServices {
    pub kinds: Arc<ResourceKindRegistry>,
    pub manager: Arc<dyn ResourceManager>,
    pub names: Arc<NameRegistry>,
}

impl AssetServices {
    pub fn new(
        kinds: Arc<ResourceKindRegistry>,
        manager: Arc<dyn ResourceManager>,
        names: Arc<NameRegistry>,
    ) -> Self {
        Self {
            kinds,
            manager,
            names,
        }
    }
}

impl fmt::Debug for AssetServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetServices")
            .field("kinds", &self.kinds)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}
