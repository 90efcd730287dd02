//! Cadence Asset Streaming
//!
//! Resource contracts and incremental, weighted preloading of resource
//! collections.

pub mod collection;
pub mod kind_registry;
pub mod memory;
pub mod name_registry;
pub mod resource;

pub use collection::{
    schedule_incremental_preload, CollectionDescriptor, CollectionEntry, CollectionResource,
    DescriptorError, PreloadStatus,
};
pub use kind_registry::ResourceKindRegistry;
pub use memory::MemoryResourceManager;
pub use name_registry::NameRegistry;
pub use resource::{
    AssetServices, LoadingState, ResourceHandle, ResourceId, ResourceKind, ResourceManager,
};
