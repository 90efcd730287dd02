//! Asset type tag -> resource kind lookup.
//!
//! Kinds are registered explicitly at startup; there is no reflection-based
//! discovery.

use crate::ResourceKind;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
pub struct ResourceKindRegistry {
    kinds: RwLock<HashMap<String, Arc<dyn ResourceKind>>>,
}

impl ResourceKindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind under its asset type tag, replacing any previous one.
    pub fn register(&self, kind: Arc<dyn ResourceKind>) -> Option<Arc<dyn ResourceKind>> {
        let tag = kind.asset_type().to_string();
        tracing::debug!(asset_type = %tag, "resource kind registered");
        self.kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag, kind)
    }

    pub fn unregister(&self, asset_type: &str) -> Option<Arc<dyn ResourceKind>> {
        self.kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(asset_type)
    }

    pub fn find(&self, asset_type: &str) -> Option<Arc<dyn ResourceKind>> {
        self.kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(asset_type)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.kinds.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ResourceKindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds = self.kinds.read().unwrap_or_else(PoisonError::into_inner);
        let mut tags: Vec<&String> = kinds.keys().collect();
        tags.sort();
        f.debug_struct("ResourceKindRegistry")
            .field("kinds", &tags)
            .finish()
    }
}
