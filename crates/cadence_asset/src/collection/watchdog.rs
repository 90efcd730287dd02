//! Re-issues preload requests for queued resources that were observed back
//! in the `Unrequested` state, a bounded number per progress check.

use crate::{ResourceHandle, ResourceManager};

/// Most pokes a single progress check performs; the rest wait for the next check.
pub const MAX_POKES_PER_CHECK: usize = 3;

/// One progress check's worth of watchdog work.
pub(crate) struct PreloadWatchdog<'a> {
    manager: &'a dyn ResourceManager,
    remaining: usize,
}

impl<'a> PreloadWatchdog<'a> {
    pub(crate) fn new(manager: &'a dyn ResourceManager) -> Self {
        Self::with_limit(manager, MAX_POKES_PER_CHECK)
    }

    pub(crate) fn with_limit(manager: &'a dyn ResourceManager, limit: usize) -> Self {
        Self {
            manager,
            remaining: limit,
        }
    }

    /// Request `handle` again if this check still has pokes left.
    pub(crate) fn poke(&mut self, handle: ResourceHandle, resource_id: &str) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        tracing::warn!(
            %resource_id,
            "queued resource reverted to unrequested; re-issuing preload"
        );
        self.manager.preload(handle);
        true
    }
}
