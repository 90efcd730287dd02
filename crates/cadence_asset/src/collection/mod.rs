//! Resource collections
//!
//! A collection is a static list of resource references plus the runtime
//! state of preloading them.

mod descriptor;
mod incremental;
mod preload;
pub mod utils;
mod watchdog;

pub use descriptor::{
    CollectionDescriptor, CollectionEntry, DescriptorError, DESCRIPTOR_MAGIC, DESCRIPTOR_VERSION,
};
pub use incremental::{incremental_preload_key, schedule_incremental_preload};
pub use preload::{CollectionResource, PreloadStatus};
pub use watchdog::MAX_POKES_PER_CHECK;
