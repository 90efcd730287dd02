//! Process-wide display name -> resource id associations.
//!
//! Holds only strings; collections own their entries and must unregister
//! their names before they are destroyed. Callers never hold a collection
//! lock while taking this registry's lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct NameRegistry {
    names: Mutex<HashMap<String, String>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, resource_id: impl Into<String>) {
        self.lock().insert(name.into(), resource_id.into());
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    /// Register many names under one lock acquisition.
    pub fn register_all<I>(&self, names: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut table = self.lock();
        for (name, resource_id) in names {
            tracing::trace!(%name, %resource_id, "named resource registered");
            table.insert(name, resource_id);
        }
    }

    /// Unregister many names under one lock acquisition.
    pub fn unregister_all<I>(&self, names: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut table = self.lock();
        for name in names {
            table.remove(&name);
        }
    }

    pub fn resolve(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
