//! Session Store
//!
//! Single source of truth for who is signed in. The token and the cached
//! user record live in a `StorageBackend` under two keys and are always
//! written and cleared together, through `set_auth_session` and
//! `clear_auth_session` only. Every mutation emits `PortalEvent::AuthChanged`
//! on this store's bus before returning.
//!
//! Writes made through another view of the same storage area (another tab)
//! do not touch this bus directly; `spawn_storage_sync` or
//! `apply_storage_change` turn them into local `AuthChanged` events.

use crate::error::{Error, Result};
use crate::events::{EventBus, PortalEvent, Subscription};
use crate::storage::{StorageBackend, StorageChange};
use hhh_common::{Role, UserRecord};
use hhh_config::StorageConfig;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Token plus cached profile of the signed-in user
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: UserRecord,
}

pub struct SessionStore {
    storage: Arc<dyn StorageBackend>,
    bus: EventBus,
    token_key: String,
    user_key: String,
}

impl SessionStore {
    /// Store using the default `token` and `user` keys
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self::from_config(storage, &StorageConfig::default())
    }

    pub fn from_config(storage: Arc<dyn StorageBackend>, config: &StorageConfig) -> Self {
        Self {
            storage,
            bus: EventBus::new(),
            token_key: config.token_key.clone(),
            user_key: config.user_key.clone(),
        }
    }

    /// Share an existing bus instead of creating a new one
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Current bearer token, if any. Empty values count as absent.
    pub fn get_token(&self) -> Option<String> {
        match self.storage.get_item(&self.token_key) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read session token");
                None
            }
        }
    }

    /// Cached user record, if any.
    ///
    /// A stored blob that does not decode is removed and treated as absent.
    pub fn get_current_user(&self) -> Option<UserRecord> {
        let raw = match self.storage.get_item(&self.user_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read session user");
                return None;
            }
        };

        match serde_json::from_str::<UserRecord>(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Stored user record is corrupt, removing it");
                if let Err(e) = self.storage.remove_item(&self.user_key) {
                    warn!(error = %e, "Failed to remove corrupt user record");
                }
                None
            }
        }
    }

    /// Both halves of the session, or `None` if either is missing
    pub fn snapshot(&self) -> Option<Session> {
        let token = self.get_token()?;
        let user = self.get_current_user()?;
        Some(Session { token, user })
    }

    /// Signed in means a token and a readable user record are both present
    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Whether the signed-in user's role is one of `allowed_roles`
    pub fn has_role(&self, allowed_roles: &[Role]) -> bool {
        match self.snapshot() {
            Some(session) => allowed_roles.contains(&session.user.role),
            None => false,
        }
    }

    /// Write token and user together, then notify subscribers.
    ///
    /// If either write fails the previous token is put back (or, failing
    /// that, the whole session is cleared), subscribers are notified so they
    /// re-read storage, and the write error is returned.
    pub fn set_auth_session(&self, token: &str, user: &UserRecord) -> Result<()> {
        if token.is_empty() {
            return Err(Error::Storage("refusing to store an empty token".to_string()));
        }
        let user_json = serde_json::to_string(user)?;
        let previous_token = self.storage.get_item(&self.token_key).ok().flatten();

        let written = self
            .storage
            .set_item(&self.token_key, token)
            .and_then(|_| self.storage.set_item(&self.user_key, &user_json));
        if let Err(e) = written {
            warn!(error = %e, "Failed to store session, rolling back");
            self.restore_token(previous_token.as_deref());
            self.bus.emit(PortalEvent::AuthChanged);
            return Err(e);
        }

        info!(role = %user.role, "Session stored");
        self.bus.emit(PortalEvent::AuthChanged);
        Ok(())
    }

    fn restore_token(&self, previous: Option<&str>) {
        let restored = match previous {
            Some(token) => self.storage.set_item(&self.token_key, token),
            None => self.storage.remove_item(&self.token_key),
        };
        let Err(e) = restored else {
            return;
        };

        warn!(error = %e, "Failed to restore previous token, clearing session");
        for key in [&self.token_key, &self.user_key] {
            if let Err(e) = self.storage.remove_item(key) {
                error!(key = %key, error = %e, "Session left partially written");
            }
        }
    }

    /// Remove token and user, then notify subscribers.
    ///
    /// Both removals are attempted and the notification is sent even if one
    /// of them fails; the first failure is returned.
    pub fn clear_auth_session(&self) -> Result<()> {
        let token_result = self.storage.remove_item(&self.token_key);
        let user_result = self.storage.remove_item(&self.user_key);

        info!("Session cleared");
        self.bus.emit(PortalEvent::AuthChanged);

        token_result.and(user_result)
    }

    /// Register a listener for this store's bus
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(PortalEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn emit_chatbot_open(&self) {
        self.bus.emit(PortalEvent::ChatbotOpen);
    }

    pub fn emit_chatbot_toggle(&self) {
        self.bus.emit(PortalEvent::ChatbotToggle);
    }

    /// Whether `key` is one of the two session keys
    pub fn is_session_key(&self, key: &str) -> bool {
        key == self.token_key || key == self.user_key
    }

    /// Re-announce a storage change made through another view.
    ///
    /// Returns true when the change concerned the session and an
    /// `AuthChanged` event was emitted. Changes from this store's own view
    /// are ignored; they were already announced by the mutator.
    pub fn apply_storage_change(&self, change: &StorageChange) -> bool {
        if change.origin == self.storage.view_id() || !self.is_session_key(&change.key) {
            return false;
        }

        debug!(key = %change.key, origin = change.origin, "Session changed in another view");
        self.bus.emit(PortalEvent::AuthChanged);
        true
    }

    /// Forward foreign storage changes to this store's bus until the store
    /// is dropped or the storage area goes away.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_storage_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.storage.watch();
        let store = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let received = rx.recv().await;
                let Some(store) = store.upgrade() else {
                    break;
                };

                match received {
                    Ok(change) => {
                        store.apply_storage_change(&change);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Lost track of what changed; make observers re-read
                        warn!(skipped, "Storage sync lagged");
                        store.bus.emit(PortalEvent::AuthChanged);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Storage sync stopped");
        })
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("view", &self.storage.view_id())
            .field("token_key", &self.token_key)
            .field("user_key", &self.user_key)
            .finish()
    }
}
