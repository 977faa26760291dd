//! "Still mounted" flag for components with requests in flight.
//!
//! Requests are never cancelled when a component goes away; instead the
//! component flips its flag on unmount and late results are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MountGuard {
    mounted: Arc<AtomicBool>,
}

impl MountGuard {
    pub fn new() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::Release);
    }

    /// Run `f` only if still mounted
    pub fn apply<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        if self.is_mounted() {
            Some(f())
        } else {
            None
        }
    }
}

impl Default for MountGuard {
    fn default() -> Self {
        Self::new()
    }
}
