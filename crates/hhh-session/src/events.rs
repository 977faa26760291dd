//! In-process event bus
//!
//! Payload-free signals shared by every mounted region of the portal.
//! Delivery is synchronous, in registration order, on the emitting thread.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Signals published on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalEvent {
    /// The session was written or cleared
    AuthChanged,
    /// Ask the chatbot widget to open
    ChatbotOpen,
    /// Ask the chatbot widget to toggle
    ChatbotToggle,
}

type Listener = Arc<dyn Fn(PortalEvent) + Send + Sync>;

struct Registry {
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

/// Publish/subscribe bus. Clones share the same listener list.
#[derive(Clone)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// `Subscription` is dropped or cancelled.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(PortalEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .listeners
            .lock()
            .push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every listener registered at the time of the call.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe,
    /// unsubscribe or emit from inside their callback.
    pub fn emit(&self, event: PortalEvent) {
        let snapshot: Vec<Listener> = self
            .registry
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        trace!(?event, listeners = snapshot.len(), "Emitting portal event");
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.listeners.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle for a registered listener; unsubscribes on drop
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Unsubscribe now
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
