//! Route Guard
//!
//! Decides, on every navigation, whether a protected subtree renders or the
//! router redirects. Authentication is checked before roles, so a signed-out
//! visitor is always sent to login, never to the forbidden page. The only
//! exception is the `BypassPolicy`, which is consulted first and is empty
//! unless configured.

use crate::events::{PortalEvent, Subscription};
use crate::mount::MountGuard;
use crate::oauth::Navigation;
use crate::session::{Session, SessionStore};
use hhh_common::Role;
use hhh_config::{GuardConfig, PortalConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a visitor stands relative to a guarded route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Unauthenticated,
    AuthenticatedUnauthorized,
    Authorized,
}

/// What the router should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// Go to login, remembering where the visitor wanted to go
    RedirectToLogin(Navigation),
    RedirectToForbidden(Navigation),
}

impl GuardDecision {
    pub fn state(&self) -> GuardState {
        match self {
            GuardDecision::Render => GuardState::Authorized,
            GuardDecision::RedirectToLogin(_) => GuardState::Unauthenticated,
            GuardDecision::RedirectToForbidden(_) => GuardState::AuthenticatedUnauthorized,
        }
    }

    pub fn navigation(&self) -> Option<&Navigation> {
        match self {
            GuardDecision::Render => None,
            GuardDecision::RedirectToLogin(nav) | GuardDecision::RedirectToForbidden(nav) => Some(nav),
        }
    }
}

/// `path` equals `prefix` or continues it at a segment boundary
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

// ============================================================================
// Bypass policy
// ============================================================================

/// Grants access to `role`-gated routes under `path_prefix` without
/// looking at the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BypassRule {
    pub role: Role,
    pub path_prefix: String,
}

/// Explicit carve-outs from the guard. Empty by default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BypassPolicy {
    rules: Vec<BypassRule>,
}

impl BypassPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            rules: config
                .bypass
                .iter()
                .map(|rule| BypassRule {
                    role: rule.role.clone(),
                    path_prefix: rule.path_prefix.clone(),
                })
                .collect(),
        }
    }

    pub fn with_rule(mut self, role: Role, path_prefix: impl Into<String>) -> Self {
        self.rules.push(BypassRule {
            role,
            path_prefix: path_prefix.into(),
        });
        self
    }

    pub fn rules(&self) -> &[BypassRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a rule admits `pathname` for a route open to `allowed_roles`
    pub fn admits(&self, pathname: &str, allowed_roles: &[Role]) -> Option<&BypassRule> {
        self.rules.iter().find(|rule| {
            allowed_roles.contains(&rule.role) && path_has_prefix(pathname, &rule.path_prefix)
        })
    }
}

// ============================================================================
// Route table
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRoute {
    pub prefix: String,
    /// Roles admitted. Empty admits any signed-in user.
    pub allowed_roles: Vec<Role>,
}

/// Declarative map of protected subtrees. Paths outside every entry are public.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<ProtectedRoute>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The portal's role-scoped dashboards. Platform and audit views live
    /// under the admin tree.
    pub fn portal_default() -> Self {
        Self::new()
            .protect("/portal/student", vec![Role::Student])
            .protect("/portal/hr", vec![Role::Hr])
            .protect("/portal/admin", vec![Role::Admin])
    }

    pub fn protect(mut self, prefix: impl Into<String>, allowed_roles: Vec<Role>) -> Self {
        self.routes.push(ProtectedRoute {
            prefix: prefix.into(),
            allowed_roles,
        });
        self
    }

    /// Most specific protected route containing `pathname`
    pub fn lookup(&self, pathname: &str) -> Option<&ProtectedRoute> {
        self.routes
            .iter()
            .filter(|route| path_has_prefix(pathname, &route.prefix))
            .max_by_key(|route| route.prefix.trim_end_matches('/').len())
    }

    pub fn routes(&self) -> &[ProtectedRoute] {
        &self.routes
    }
}

// ============================================================================
// Guard
// ============================================================================

/// Classify a visitor. Pure; the session is passed in.
pub fn classify(
    session: Option<&Session>,
    pathname: &str,
    allowed_roles: &[Role],
    bypass: &BypassPolicy,
) -> GuardState {
    if bypass.admits(pathname, allowed_roles).is_some() {
        return GuardState::Authorized;
    }

    let Some(session) = session else {
        return GuardState::Unauthenticated;
    };

    if allowed_roles.is_empty() || allowed_roles.contains(&session.user.role) {
        GuardState::Authorized
    } else {
        GuardState::AuthenticatedUnauthorized
    }
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: Arc<SessionStore>,
    routes: RouteTable,
    bypass: BypassPolicy,
    login_path: String,
    forbidden_path: String,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionStore>, config: &PortalConfig) -> Self {
        let bypass = BypassPolicy::from_config(&config.guard);
        if !bypass.is_empty() {
            warn!(rules = bypass.rules().len(), "Route guard bypass rules are active");
        }

        Self {
            session,
            routes: RouteTable::portal_default(),
            bypass,
            login_path: config.routes.login_path.clone(),
            forbidden_path: config.routes.forbidden_path.clone(),
        }
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_bypass(mut self, bypass: BypassPolicy) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn state(&self, pathname: &str, allowed_roles: &[Role]) -> GuardState {
        let session = self.session.snapshot();
        classify(session.as_ref(), pathname, allowed_roles, &self.bypass)
    }

    /// Decide for a subtree open to `allowed_roles`. Reads the session
    /// fresh on every call.
    pub fn evaluate(&self, pathname: &str, allowed_roles: &[Role]) -> GuardDecision {
        let state = self.state(pathname, allowed_roles);
        debug!(pathname, ?state, "Route guard evaluated");

        match state {
            GuardState::Authorized => GuardDecision::Render,
            GuardState::Unauthenticated => GuardDecision::RedirectToLogin(
                Navigation::replace(self.login_path.clone()).with_from(pathname),
            ),
            GuardState::AuthenticatedUnauthorized => {
                GuardDecision::RedirectToForbidden(Navigation::replace(self.forbidden_path.clone()))
            }
        }
    }

    /// Decide using the route table. Unprotected paths render.
    pub fn check(&self, pathname: &str) -> GuardDecision {
        match self.routes.lookup(pathname) {
            Some(route) => self.evaluate(pathname, &route.allowed_roles),
            None => GuardDecision::Render,
        }
    }
}

// ============================================================================
// Mounted guarded view
// ============================================================================

struct ViewState {
    pathname: String,
    allowed_roles: Vec<Role>,
    decision: GuardDecision,
}

/// A mounted guarded component. Re-evaluates on navigation and on every
/// `AuthChanged` delivered while mounted.
pub struct GuardedView {
    guard: RouteGuard,
    state: Arc<Mutex<ViewState>>,
    mount: MountGuard,
    _subscription: Subscription,
}

impl GuardedView {
    pub fn mount(guard: RouteGuard, pathname: impl Into<String>, allowed_roles: Vec<Role>) -> Self {
        let pathname = pathname.into();
        let decision = guard.evaluate(&pathname, &allowed_roles);
        let state = Arc::new(Mutex::new(ViewState {
            pathname,
            allowed_roles,
            decision,
        }));
        let mount = MountGuard::new();

        let listener_guard = guard.clone();
        let listener_state = Arc::downgrade(&state);
        let listener_mount = mount.clone();
        let subscription = guard.session().subscribe(move |event| {
            if event != PortalEvent::AuthChanged {
                return;
            }
            let Some(state) = listener_state.upgrade() else {
                return;
            };
            listener_mount.apply(|| {
                let mut view = state.lock();
                view.decision = listener_guard.evaluate(&view.pathname, &view.allowed_roles);
            });
        });

        Self {
            guard,
            state,
            mount,
            _subscription: subscription,
        }
    }

    /// Mount using the route table entry for `pathname`
    pub fn mount_for_path(guard: RouteGuard, pathname: impl Into<String>) -> Self {
        let pathname = pathname.into();
        let allowed_roles = guard
            .routes()
            .lookup(&pathname)
            .map(|route| route.allowed_roles.clone())
            .unwrap_or_default();
        Self::mount(guard, pathname, allowed_roles)
    }

    pub fn decision(&self) -> GuardDecision {
        self.state.lock().decision.clone()
    }

    pub fn pathname(&self) -> String {
        self.state.lock().pathname.clone()
    }

    /// Navigate within the guarded subtree
    pub fn navigate(&self, pathname: impl Into<String>) -> GuardDecision {
        let mut view = self.state.lock();
        view.pathname = pathname.into();
        view.decision = self.guard.evaluate(&view.pathname, &view.allowed_roles);
        view.decision.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.mount.is_mounted()
    }

    /// Stop reacting to session changes
    pub fn unmount(self) {
        self.mount.unmount();
    }
}

impl std::fmt::Debug for GuardedView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let view = self.state.lock();
        f.debug_struct("GuardedView")
            .field("pathname", &view.pathname)
            .field("decision", &view.decision)
            .finish()
    }
}
