//! Route guard and session propagation tests
//!
//! Tests for:
//! - Several mounted guards observing one logout
//! - Login / forbidden / render decisions
//! - Session changes arriving from another view of the same storage
//! - File-backed sessions surviving a restart
//! - Configured bypass rules

use std::sync::Arc;
use std::time::Duration;

use hhh_config::{BypassRuleConfig, PortalConfig};
use hhh_session::{
    GuardDecision, GuardState, GuardedView, MemoryStorage, Navigation, PortalContext, PortalEvent, Role,
    RouteGuard, SessionStore, UserRecord,
};
use tokio::sync::mpsc;

fn guard_for(store: &Arc<SessionStore>) -> RouteGuard {
    RouteGuard::new(store.clone(), &PortalConfig::default())
}

fn hr_user() -> UserRecord {
    UserRecord::new(Role::Hr, "h@example.com", "Hana").with_hr_approved(true)
}

#[test]
fn test_two_views_observe_one_logout() {
    let store = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
    store.set_auth_session("tok", &hr_user()).unwrap();

    let guard = guard_for(&store);
    let header = GuardedView::mount(guard.clone(), "/portal/hr/dashboard", vec![Role::Hr]);
    let sidebar = GuardedView::mount(guard, "/portal/hr/jobs", vec![Role::Hr, Role::Admin]);
    assert_eq!(header.decision(), GuardDecision::Render);
    assert_eq!(sidebar.decision(), GuardDecision::Render);

    store.clear_auth_session().unwrap();

    assert_eq!(
        header.decision(),
        GuardDecision::RedirectToLogin(Navigation::replace("/login").with_from("/portal/hr/dashboard"))
    );
    assert_eq!(sidebar.decision().state(), GuardState::Unauthenticated);
}

#[test]
fn test_signed_out_visitor_goes_to_login_not_forbidden() {
    let store = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
    let guard = guard_for(&store);

    let decision = guard.check("/portal/admin/audit");
    let navigation = decision.navigation().unwrap();
    assert_eq!(decision.state(), GuardState::Unauthenticated);
    assert_eq!(navigation.to, "/login");
    assert!(navigation.replace);
    assert_eq!(navigation.from.as_deref(), Some("/portal/admin/audit"));
}

#[test]
fn test_wrong_role_goes_to_forbidden() {
    let store = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
    store
        .set_auth_session("tok", &UserRecord::new(Role::Student, "s@example.com", "Sam"))
        .unwrap();
    let guard = guard_for(&store);

    assert_eq!(
        guard.check("/portal/hr/jobs"),
        GuardDecision::RedirectToForbidden(Navigation::replace("/unauthorized"))
    );
    assert_eq!(guard.check("/portal/student/dashboard"), GuardDecision::Render);
    // Public pages are not guarded
    assert_eq!(guard.check("/jobs/42"), GuardDecision::Render);
}

#[test]
fn test_login_unlocks_view_and_navigation_reevaluates() {
    let store = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
    let view = GuardedView::mount_for_path(guard_for(&store), "/portal/hr/dashboard");
    assert_eq!(view.decision().state(), GuardState::Unauthenticated);

    store.set_auth_session("tok", &hr_user()).unwrap();
    assert_eq!(view.decision(), GuardDecision::Render);

    assert_eq!(view.navigate("/portal/hr/candidates"), GuardDecision::Render);
    assert_eq!(view.pathname(), "/portal/hr/candidates");
}

#[test]
fn test_unmounted_view_ignores_changes() {
    let store = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
    store.set_auth_session("tok", &hr_user()).unwrap();

    let stays = GuardedView::mount(guard_for(&store), "/portal/hr/dashboard", vec![Role::Hr]);
    let leaves = GuardedView::mount(guard_for(&store), "/portal/hr/jobs", vec![Role::Hr]);
    leaves.unmount();

    store.clear_auth_session().unwrap();
    assert_eq!(stays.decision().state(), GuardState::Unauthenticated);
}

#[tokio::test]
async fn test_change_in_other_view_reaches_guard() {
    let first_tab = MemoryStorage::new();
    let second_tab = first_tab.open_view();

    let writer = Arc::new(SessionStore::new(Arc::new(first_tab)));
    let reader = Arc::new(SessionStore::new(Arc::new(second_tab)));
    let sync = reader.spawn_storage_sync();

    let view = GuardedView::mount(guard_for(&reader), "/portal/hr/dashboard", vec![Role::Hr]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = reader.subscribe(move |event| {
        let _ = tx.send(event);
    });

    writer.set_auth_session("tok", &hr_user()).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no change delivered")
        .unwrap();
    assert_eq!(event, PortalEvent::AuthChanged);
    assert_eq!(view.decision(), GuardDecision::Render);
    assert!(reader.is_authenticated());

    drop(view);
    drop(reader);
    writer.clear_auth_session().unwrap();
    tokio::time::timeout(Duration::from_secs(2), sync)
        .await
        .expect("sync task kept running")
        .unwrap();
}

#[tokio::test]
async fn test_own_writes_not_echoed_by_sync() {
    let store = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
    let _sync = store.spawn_storage_sync();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = store.subscribe(move |event| {
        let _ = tx.send(event);
    });

    store.set_auth_session("tok", &hr_user()).unwrap();
    assert_eq!(rx.recv().await, Some(PortalEvent::AuthChanged));

    let echoed = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(echoed.is_err(), "unexpected echo: {echoed:?}");
}

#[test]
fn test_file_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PortalConfig::default();
    config.storage.path = dir.path().join("session.json").to_string_lossy().into_owned();

    {
        let portal = PortalContext::from_config(config.clone()).unwrap();
        assert!(!portal.session.is_authenticated());
        portal.session.set_auth_session("persisted", &hr_user()).unwrap();
    }

    let portal = PortalContext::from_config(config).unwrap();
    let session = portal.session.snapshot().unwrap();
    assert_eq!(session.token, "persisted");
    assert!(session.user.is_hr_approved);
    assert_eq!(portal.guard.check("/portal/hr/dashboard"), GuardDecision::Render);
}

#[test]
fn test_configured_bypass_rule() {
    let mut config = PortalConfig::default();
    config
        .guard
        .bypass
        .push(BypassRuleConfig::parse("admin:/portal/admin/audit").unwrap());

    let portal = PortalContext::with_storage(config, Arc::new(MemoryStorage::new())).unwrap();

    assert_eq!(portal.guard.check("/portal/admin/audit/logs"), GuardDecision::Render);
    assert_eq!(
        portal.guard.check("/portal/admin/users").state(),
        GuardState::Unauthenticated
    );
    assert_eq!(
        portal.guard.check("/portal/admin/auditing").state(),
        GuardState::Unauthenticated
    );
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = PortalConfig::default();
    config.routes.login_path = "login".to_string();

    let err = PortalContext::with_storage(config, Arc::new(MemoryStorage::new())).unwrap_err();
    assert!(matches!(err, hhh_session::Error::Config(_)));
}
