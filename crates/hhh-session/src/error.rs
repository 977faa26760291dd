//! Error types for the HHH Jobs session core

use serde::Deserialize;
use thiserror::Error;

/// Result type alias for session core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the session core
#[derive(Error, Debug)]
pub enum Error {
    /// The API could not be reached at all (DNS, refused connection, TLS)
    #[error("Unable to reach the HHH Jobs API at {url}. Check that the server is running and reachable: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Session rejected by the backend (401). The local session is already cleared.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Role mismatch reported by the backend (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Any other non-success response
    #[error("Request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    /// Storage medium failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP request failed after the connection was established
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL or path
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] hhh_config::ConfigError),
}

/// Error envelope the backend returns on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl Error {
    /// Create an error from an HTTP status code and response body.
    ///
    /// Uses the backend's `message` field when the body is JSON carrying
    /// one, otherwise the raw body, otherwise the status reason.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = extract_message(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

        match status.as_u16() {
            401 => Error::Authentication(message),
            403 => Error::Forbidden(message),
            code => Error::Api {
                status: code,
                message,
            },
        }
    }

    /// Whether the error means the API was unreachable
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity { .. })
    }

    /// Status code carried by the error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Authentication(_) => Some(401),
            Error::Forbidden(_) => Some(403),
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<ErrorBody>(trimmed) {
        Ok(ErrorBody {
            message: Some(message),
        }) if !message.is_empty() => Some(message),
        Ok(_) => None,
        Err(_) => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_uses_message_field() {
        let err = Error::from_status(StatusCode::BAD_REQUEST, r#"{"message":"Email already registered"}"#);
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Email already registered");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_status_classification() {
        assert!(matches!(
            Error::from_status(StatusCode::UNAUTHORIZED, ""),
            Error::Authentication(_)
        ));
        assert!(matches!(
            Error::from_status(StatusCode::FORBIDDEN, "{}"),
            Error::Forbidden(m) if m == "Forbidden"
        ));
        assert_eq!(Error::from_status(StatusCode::BAD_GATEWAY, "upstream down").status(), Some(502));
    }

    #[test]
    fn test_from_status_plain_text_body() {
        let err = Error::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(err.to_string(), "Request failed with status 500: boom");
    }
}
