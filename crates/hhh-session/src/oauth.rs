//! OAuth Callback Resolver
//!
//! The provider redirect lands on the callback route with either
//! `token` + `user` (base64url JSON) + optional `redirectTo`, or `error`.
//! Resolution is all-or-nothing: the session is written only after the
//! user payload decoded completely, and a given callback instance is
//! resolved exactly once.

use crate::session::SessionStore;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hhh_common::{get_dashboard_path_by_role, UserRecord};
use parking_lot::Mutex;
use std::borrow::Cow;
use thiserror::Error;
use tracing::{info, warn};
use url::{form_urlencoded, Url};

pub const INCOMPLETE_RESPONSE_MESSAGE: &str =
    "The sign-in response was incomplete. Please try signing in again.";
pub const UNREADABLE_RESPONSE_MESSAGE: &str =
    "We could not read the sign-in response. Please try signing in again.";

/// Why a user payload could not be decoded
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("payload is not a user record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Query parameters carried by the callback URL. Empty values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthCallbackParams {
    pub token: Option<String>,
    pub user: Option<String>,
    pub redirect_to: Option<String>,
    pub error: Option<String>,
}

impl OAuthCallbackParams {
    /// Parse an `application/x-www-form-urlencoded` query string, with or
    /// without the leading `?`
    pub fn from_query(query: &str) -> Self {
        Self::from_pairs(form_urlencoded::parse(query.trim_start_matches('?').as_bytes()))
    }

    /// Read the parameters of a parsed callback URL. The fragment is ignored.
    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs())
    }

    /// Parse the location the browser landed on. Relative locations such as
    /// `/oauth/callback?token=..` are resolved against `page_origin`.
    pub fn parse(location: &str, page_origin: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(page_origin)?.join(location)?;
        Ok(Self::from_url(&url))
    }

    fn from_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Self {
        let mut params = Self::default();

        for (key, value) in pairs {
            if value.is_empty() {
                continue;
            }

            // First occurrence wins
            let slot = match key.as_ref() {
                "token" => &mut params.token,
                "user" => &mut params.user,
                "redirectTo" => &mut params.redirect_to,
                "error" => &mut params.error,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        params
    }
}

/// Decode a base64url JSON user record.
///
/// The URL-safe alphabet is mapped back to the standard one and padding is
/// restored to a multiple of four before decoding.
pub fn decode_user_payload(encoded: &str) -> Result<UserRecord, PayloadError> {
    let mut standard: String = encoded
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }

    let bytes = STANDARD.decode(standard.as_bytes())?;
    let json = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&json)?)
}

/// Where the router should go next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub to: String,
    /// Replace the current history entry instead of pushing
    pub replace: bool,
    /// Path to return to after signing in, carried as navigation state
    pub from: Option<String>,
}

impl Navigation {
    pub fn push(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            replace: false,
            from: None,
        }
    }

    pub fn replace(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            replace: true,
            from: None,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

/// Terminal result of resolving a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Session written; navigate with history replacement
    Redirect(Navigation),
    /// Nothing written; show `message`
    Failed { message: String },
}

impl CallbackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallbackOutcome::Redirect(_))
    }
}

/// One callback URL instance. Resolving it twice yields the first outcome
/// again without touching the session store.
#[derive(Debug)]
pub struct OAuthCallback {
    params: OAuthCallbackParams,
    outcome: Mutex<Option<CallbackOutcome>>,
}

impl OAuthCallback {
    pub fn new(params: OAuthCallbackParams) -> Self {
        Self {
            params,
            outcome: Mutex::new(None),
        }
    }

    pub fn from_url(url: &Url) -> Self {
        Self::new(OAuthCallbackParams::from_url(url))
    }

    /// Callback for a browser location, relative locations resolved against
    /// `page_origin`
    pub fn parse(location: &str, page_origin: &str) -> Result<Self, url::ParseError> {
        OAuthCallbackParams::parse(location, page_origin).map(Self::new)
    }

    pub fn params(&self) -> &OAuthCallbackParams {
        &self.params
    }

    /// Outcome of the first resolution, if any
    pub fn outcome(&self) -> Option<CallbackOutcome> {
        self.outcome.lock().clone()
    }

    pub fn resolve(&self, store: &SessionStore) -> CallbackOutcome {
        let mut slot = self.outcome.lock();
        if let Some(outcome) = slot.as_ref() {
            return outcome.clone();
        }

        let outcome = resolve_params(&self.params, store);
        *slot = Some(outcome.clone());
        outcome
    }
}

fn resolve_params(params: &OAuthCallbackParams, store: &SessionStore) -> CallbackOutcome {
    if let Some(error) = &params.error {
        warn!(error = %error, "OAuth provider returned an error");
        return CallbackOutcome::Failed {
            message: format!("Sign-in failed: {}", error),
        };
    }

    let (Some(token), Some(encoded_user)) = (&params.token, &params.user) else {
        warn!("OAuth callback is missing token or user");
        return CallbackOutcome::Failed {
            message: INCOMPLETE_RESPONSE_MESSAGE.to_string(),
        };
    };

    let user = match decode_user_payload(encoded_user) {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "OAuth user payload did not decode");
            return CallbackOutcome::Failed {
                message: UNREADABLE_RESPONSE_MESSAGE.to_string(),
            };
        }
    };

    if let Err(e) = store.set_auth_session(token, &user) {
        warn!(error = %e, "Could not store OAuth session");
        return CallbackOutcome::Failed {
            message: UNREADABLE_RESPONSE_MESSAGE.to_string(),
        };
    }

    let to = match params.redirect_to.as_deref() {
        Some(path) if is_local_path(path) => path.to_string(),
        Some(path) => {
            warn!(redirect_to = %path, "Ignoring non-local redirect target");
            get_dashboard_path_by_role(&user.role).to_string()
        }
        None => get_dashboard_path_by_role(&user.role).to_string(),
    };

    info!(role = %user.role, to = %to, "OAuth sign-in complete");
    CallbackOutcome::Redirect(Navigation::replace(to))
}

/// Same-origin absolute path: `/x`, but not `//host` or `/\host`
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}
