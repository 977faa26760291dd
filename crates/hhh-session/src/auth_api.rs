//! Authentication endpoints
//!
//! Thin typed calls over `ApiClient`. Calls that sign the user in write the
//! returned token and user to the session store, which notifies every
//! observer.

use crate::error::{Error, Result};
use crate::http::ApiClient;
use crate::session::SessionStore;
use hhh_common::{Role, UserRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Response of every call that creates a session
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserRecord,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of calls that only acknowledge
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendOtpRequest {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

/// `/auth/me` answers either `{ "user": {...} }` or the bare user
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MeResponse {
    Wrapped { user: UserRecord },
    Bare(UserRecord),
}

/// Authentication API bound to one session store
#[derive(Debug, Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        self.client.session()
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let response: AuthResponse = self.client.post_json("/auth/login", request).await?;
        self.establish(&response, "login")?;
        Ok(response)
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<AuthResponse> {
        let response: AuthResponse = self.client.post_json("/auth/signup", request).await?;
        self.establish(&response, "signup")?;
        Ok(response)
    }

    pub async fn send_otp(&self, request: &SendOtpRequest) -> Result<MessageResponse> {
        self.client.post_json("/auth/send-otp", request).await
    }

    pub async fn verify_otp(&self, request: &VerifyOtpRequest) -> Result<AuthResponse> {
        let response: AuthResponse = self.client.post_json("/auth/verify-otp", request).await?;
        self.establish(&response, "otp")?;
        Ok(response)
    }

    pub async fn forgot_password(&self, email: &str) -> Result<MessageResponse> {
        self.client
            .post_json("/auth/forgot-password", &serde_json::json!({ "email": email }))
            .await
    }

    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<MessageResponse> {
        self.client.post_json("/auth/reset-password", request).await
    }

    /// URL the browser is sent to in order to start an OAuth sign-in
    pub fn oauth_start_url(&self, provider: &str, redirect_to: Option<&str>) -> Result<String> {
        let provider = provider.trim();
        if provider.is_empty() || !provider.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(Error::InvalidUrl(format!("invalid OAuth provider '{}'", provider)));
        }

        let mut url = self
            .client
            .build_url(&format!("/auth/oauth/{}/start", provider.to_ascii_lowercase()));
        if let Some(redirect_to) = redirect_to.filter(|r| !r.is_empty()) {
            url.push_str("?redirectTo=");
            url.push_str(&urlencoding::encode(redirect_to));
        }
        Ok(url)
    }

    /// Current user according to the backend
    pub async fn me(&self) -> Result<UserRecord> {
        let response: MeResponse = self.client.get_json("/auth/me").await?;
        Ok(match response {
            MeResponse::Wrapped { user } => user,
            MeResponse::Bare(user) => user,
        })
    }

    /// Drop the local session
    pub fn logout(&self) -> Result<()> {
        info!("Logging out");
        self.session().clear_auth_session()
    }

    fn establish(&self, response: &AuthResponse, via: &'static str) -> Result<()> {
        self.session().set_auth_session(&response.token, &response.user)?;
        info!(via, role = %response.user.role, "Signed in");
        Ok(())
    }
}
