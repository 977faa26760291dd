//! HTTP Client Wrapper
//!
//! Uniform request shaping for every call to the portal API:
//! - base URL resolution from configuration
//! - JSON content type for non-form bodies
//! - bearer token from the session store
//! - session invalidation on 401
//!
//! Each call is independent and sent at most once. Nothing is retried or
//! queued here.

use crate::error::{Error, Result};
use crate::session::SessionStore;
use hhh_config::{ApiConfig, PortalConfig};
use reqwest::header::{HeaderMap, HeaderValue, IntoHeaderName, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolve the API base URL.
///
/// An explicit base wins; otherwise development builds use the local
/// development server and everything else uses the page's own origin.
/// Trailing slashes are removed.
pub fn resolve_base_url(api: &ApiConfig, dev_mode: bool) -> String {
    let explicit = api
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|base| !base.is_empty());

    let base = match explicit {
        Some(base) => base,
        None if dev_mode => api.dev_base_url.trim(),
        None => api.page_origin.trim(),
    };

    base.trim_end_matches('/').to_string()
}

/// Join a base URL and a path with exactly one slash between them
pub fn build_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Body of an outgoing request
#[derive(Debug)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
    /// Multipart form; the client library sets its own content type
    Form(reqwest::multipart::Form),
}

/// Method, headers and body of a request. Defaults to a bare GET.
#[derive(Debug)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn patch() -> Self {
        Self::new(Method::PATCH)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON request body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    pub fn form(mut self, form: reqwest::multipart::Form) -> Self {
        self.body = Some(RequestBody::Form(form));
        self
    }
}

/// Portal API client
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http_client: reqwest::Client,
    session: Arc<SessionStore>,
}

impl ApiClient {
    /// Create a client from the portal configuration
    pub fn new(config: &PortalConfig, session: Arc<SessionStore>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.api.timeout_ms))
            .user_agent(&config.api.user_agent)
            .build()?;

        Ok(Self {
            base_url: resolve_base_url(&config.api, config.dev_mode),
            http_client,
            session,
        })
    }

    /// Create a client against an explicit base URL with default settings
    pub fn with_base_url(base_url: impl Into<String>, session: Arc<SessionStore>) -> Result<Self> {
        let mut config = PortalConfig::default();
        config.api.base_url = Some(base_url.into());
        Self::new(&config, session)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn build_url(&self, path: &str) -> String {
        build_url(&self.base_url, path)
    }

    /// Send a request and return the raw response.
    ///
    /// Caller headers are kept. `Content-Type: application/json` is added for
    /// non-form bodies and `Authorization: Bearer <token>` when a token is
    /// stored, each only if the caller did not set that header already.
    ///
    /// A 401 response clears the session before the response is returned;
    /// it is not turned into an error. A failure to reach the server at all
    /// becomes `Error::Connectivity` naming the target URL.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let url = self.build_url(path);
        let RequestOptions {
            method,
            mut headers,
            body,
        } = options;

        let wants_json_type = matches!(
            body,
            Some(RequestBody::Json(_)) | Some(RequestBody::Text(_)) | Some(RequestBody::Bytes(_))
        );
        if wants_json_type && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if !headers.contains_key(AUTHORIZATION) {
            if let Some(token) = self.session.get_token() {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                    Error::Storage("stored token is not a valid header value".to_string())
                })?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }

        let mut builder = self.http_client.request(method.clone(), &url).headers(headers);
        builder = match body {
            Some(RequestBody::Json(value)) => builder.body(serde_json::to_vec(&value)?),
            Some(RequestBody::Text(text)) => builder.body(text),
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes),
            Some(RequestBody::Form(form)) => builder.multipart(form),
            None => builder,
        };

        debug!(%method, path = %path, "API request");

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                Error::InvalidUrl(format!("{}: {}", url, e))
            } else {
                warn!(url = %url, error = %e, "API unreachable");
                Error::Connectivity {
                    url: url.clone(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        debug!(%method, path = %path, %status, "API response");

        if status == StatusCode::UNAUTHORIZED {
            warn!(path = %path, "Session rejected by API, clearing");
            if let Err(e) = self.session.clear_auth_session() {
                warn!(error = %e, "Failed to fully clear rejected session");
            }
        }

        Ok(response)
    }

    /// Send a request and decode a successful JSON body.
    ///
    /// Non-success statuses become errors carrying the backend's `message`.
    /// An empty success body decodes as JSON `null`.
    pub async fn send_json<T>(&self, path: &str, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.request(path, options).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, &body));
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.send_json(path, RequestOptions::get()).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(path, RequestOptions::post().json(body)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: Option<&str>) -> ApiConfig {
        ApiConfig {
            base_url: base.map(str::to_string),
            dev_base_url: "http://localhost:5000/".to_string(),
            page_origin: "https://portal.example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_explicit_base_wins() {
        assert_eq!(
            resolve_base_url(&api(Some("https://api.example.com//")), true),
            "https://api.example.com"
        );
    }

    #[test]
    fn test_dev_fallback() {
        assert_eq!(resolve_base_url(&api(None), true), "http://localhost:5000");
        assert_eq!(resolve_base_url(&api(Some("  ")), true), "http://localhost:5000");
    }

    #[test]
    fn test_origin_fallback() {
        assert_eq!(resolve_base_url(&api(None), false), "https://portal.example.com");
    }

    #[test]
    fn test_build_url_single_slash() {
        assert_eq!(build_url("http://h", "auth/me"), "http://h/auth/me");
        assert_eq!(build_url("http://h", "/auth/me"), "http://h/auth/me");
        assert_eq!(build_url("http://h/", "//auth/me"), "http://h/auth/me");
        assert_eq!(build_url("http://h", ""), "http://h/");
    }

    #[test]
    fn test_request_options_builders() {
        let options = RequestOptions::post()
            .json(&serde_json::json!({"email": "a@b.c"}))
            .unwrap()
            .header("x-trace", HeaderValue::from_static("1"));

        assert_eq!(options.method, Method::POST);
        assert!(matches!(options.body, Some(RequestBody::Json(_))));
        assert_eq!(options.headers.get("X-Trace").unwrap(), "1");
    }
}
