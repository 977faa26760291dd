//! # HHH Jobs session core
//!
//! Client-side session and authorization model for the HHH Jobs portal.
//!
//! - **Session store**: token + cached user in a storage medium, written and
//!   cleared together, with synchronous change notifications
//! - **API client**: bearer token attachment, base URL resolution, session
//!   invalidation on 401
//! - **OAuth callback**: provider redirect to session, exactly once
//! - **Route guard**: login / forbidden / render decisions per navigation
//!
//! Consumers receive the pieces from a [`PortalContext`] rather than reaching
//! for global state, so tests can run against in-memory storage.
//!
//! ```rust,no_run
//! use hhh_config::PortalConfig;
//! use hhh_session::{GuardDecision, PortalContext};
//!
//! # fn main() -> hhh_session::Result<()> {
//! let portal = PortalContext::from_config(PortalConfig::load()?)?;
//!
//! match portal.guard.check("/portal/hr/dashboard") {
//!     GuardDecision::Render => println!("render"),
//!     other => println!("redirect: {:?}", other.navigation()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth_api;
pub mod error;
pub mod events;
pub mod guard;
pub mod http;
pub mod mount;
pub mod oauth;
pub mod refresh;
pub mod session;
pub mod storage;

pub use auth_api::AuthApi;
pub use error::{Error, Result};
pub use events::{EventBus, PortalEvent, Subscription};
pub use guard::{BypassPolicy, GuardDecision, GuardState, GuardedView, RouteGuard, RouteTable};
pub use http::{ApiClient, RequestBody, RequestOptions};
pub use mount::MountGuard;
pub use oauth::{CallbackOutcome, Navigation, OAuthCallback, OAuthCallbackParams};
pub use refresh::{refresh_profile, RefreshOutcome};
pub use session::{Session, SessionStore};
pub use storage::{FileStorage, MemoryStorage, StorageBackend, StorageChange};

pub use hhh_common::{get_dashboard_path_by_role, Role, UserRecord};

use hhh_config::PortalConfig;
use std::sync::Arc;
use tracing::info;

/// Everything a mounted portal region needs, wired from one configuration
#[derive(Debug, Clone)]
pub struct PortalContext {
    pub config: Arc<PortalConfig>,
    pub session: Arc<SessionStore>,
    pub client: ApiClient,
    pub auth: AuthApi,
    pub guard: RouteGuard,
}

impl PortalContext {
    /// Build on the storage medium named by the configuration: a file when
    /// `storage.path` is set, otherwise a fresh in-memory area
    pub fn from_config(config: PortalConfig) -> Result<Self> {
        let storage: Arc<dyn StorageBackend> = if config.storage.path.is_empty() {
            Arc::new(MemoryStorage::new())
        } else {
            Arc::new(FileStorage::open(&config.storage.path)?)
        };
        Self::with_storage(config, storage)
    }

    /// Build on a caller-supplied storage medium
    pub fn with_storage(config: PortalConfig, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        config.validate()?;

        let session = Arc::new(SessionStore::from_config(storage, &config.storage));
        let client = ApiClient::new(&config, session.clone())?;
        let auth = AuthApi::new(client.clone());
        let guard = RouteGuard::new(session.clone(), &config);

        info!(base_url = %client.base_url(), dev_mode = config.dev_mode, "Portal context ready");

        Ok(Self {
            config: Arc::new(config),
            session,
            client,
            auth,
            guard,
        })
    }

    /// Callback for the location the browser landed on after the provider
    /// redirect. Relative locations resolve against `api.page_origin`.
    pub fn oauth_callback(&self, location: &str) -> Result<OAuthCallback> {
        OAuthCallback::parse(location, &self.config.api.page_origin)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", location, e)))
    }
}
