//! Background profile refresh
//!
//! Re-reads `/auth/me` and folds the server's view of the user into the
//! cached record. The merged record goes back through `set_auth_session`,
//! so a changed role reaches every mounted guard through `AuthChanged`.

use crate::auth_api::AuthApi;
use crate::error::{Error, Result};
use hhh_common::{Role, UserRecord};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// No session to refresh; the API was not called
    NotSignedIn,
    /// Server and cache agree
    Unchanged,
    /// Cache updated with server fields
    Updated {
        user: UserRecord,
        role_changed: bool,
    },
    /// The session changed while the request was in flight; result dropped
    Stale,
    /// The backend rejected the token and the session was cleared
    SignedOut,
}

/// Merge server fields over the cached record.
///
/// Server values win for every field it sends; extra fields only present
/// locally are kept. A missing avatar on the server does not erase the
/// cached one.
pub fn merge_profile(cached: &UserRecord, server: &UserRecord) -> UserRecord {
    let mut merged = cached.clone();

    if server.role != Role::default() {
        merged.role = server.role.clone();
    }
    if !server.email.is_empty() {
        merged.email = server.email.clone();
    }
    if !server.name.is_empty() {
        merged.name = server.name.clone();
    }
    if server.avatar_url.is_some() {
        merged.avatar_url = server.avatar_url.clone();
    }
    merged.is_hr_approved = server.is_hr_approved;
    for (key, value) in &server.extra {
        merged.extra.insert(key.clone(), value.clone());
    }

    merged
}

/// Refresh the cached profile from the backend
pub async fn refresh_profile(api: &AuthApi) -> Result<RefreshOutcome> {
    let store = api.session();
    let Some(before) = store.snapshot() else {
        return Ok(RefreshOutcome::NotSignedIn);
    };

    let server_user = match api.me().await {
        Ok(user) => user,
        Err(Error::Authentication(_)) => {
            debug!("Profile refresh found the session rejected");
            return Ok(RefreshOutcome::SignedOut);
        }
        Err(e) => return Err(e),
    };

    // Apply only onto the session the request was made for
    let Some(current) = store.snapshot() else {
        return Ok(RefreshOutcome::Stale);
    };
    if current.token != before.token {
        return Ok(RefreshOutcome::Stale);
    }

    let merged = merge_profile(&current.user, &server_user);
    if merged == current.user {
        return Ok(RefreshOutcome::Unchanged);
    }

    let role_changed = merged.role != current.user.role;
    if role_changed {
        warn!(from = %current.user.role, to = %merged.role, "Role changed on the server");
    } else {
        info!("Profile refreshed");
    }

    store.set_auth_session(&current.token, &merged)?;
    Ok(RefreshOutcome::Updated {
        user: merged,
        role_changed,
    })
}
