//! HHH Jobs Client Configuration
//!
//! TOML-based configuration with environment variable override support.

use hhh_common::Role;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Default API base used by development builds when no explicit base is set
pub const DEFAULT_DEV_API_BASE: &str = "http://localhost:5000";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PortalConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub routes: RoutesConfig,
    pub guard: GuardConfig,

    /// Development build: enables the local API fallback
    pub dev_mode: bool,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Explicit API base URL. Takes precedence over every fallback.
    pub base_url: Option<String>,
    /// Fallback base used in development builds
    pub dev_base_url: String,
    /// Origin the portal is served from; fallback base outside development
    pub page_origin: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            dev_base_url: DEFAULT_DEV_API_BASE.to_string(),
            page_origin: "http://localhost:5173".to_string(),
            timeout_ms: 30000,
            user_agent: format!("hhh-session/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub token_key: String,
    pub user_key: String,
    /// File used to persist the session. Empty keeps it in memory.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_key: "token".to_string(),
            user_key: "user".to_string(),
            path: String::new(),
        }
    }
}

/// Redirect targets used by the route guard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    pub login_path: String,
    pub forbidden_path: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            forbidden_path: "/unauthorized".to_string(),
        }
    }
}

/// Route guard configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Role/path-prefix pairs admitted without an authentication check
    pub bypass: Vec<BypassRuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassRuleConfig {
    pub role: Role,
    pub path_prefix: String,
}

impl BypassRuleConfig {
    /// Parse `role:prefix`
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let (role, prefix) = value.split_once(':').ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "bypass rule '{}' must look like role:/path/prefix",
                value
            ))
        })?;

        Ok(Self {
            role: Role::parse(role),
            path_prefix: prefix.trim().to_string(),
        })
    }
}

impl PortalConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PortalConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Check values the session core relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, path) in [
            ("routes.login_path", &self.routes.login_path),
            ("routes.forbidden_path", &self.routes.forbidden_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "{} must start with '/': {}",
                    name, path
                )));
            }
        }

        if self.storage.token_key.is_empty() || self.storage.user_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "storage keys must not be empty".to_string(),
            ));
        }
        if self.storage.token_key == self.storage.user_key {
            return Err(ConfigError::ValidationError(
                "storage.token_key and storage.user_key must differ".to_string(),
            ));
        }

        for rule in &self.guard.bypass {
            if !rule.path_prefix.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "bypass prefix for role '{}' must start with '/': '{}'",
                    rule.role, rule.path_prefix
                )));
            }
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# HHH Jobs client configuration
# Environment variables override these settings

dev_mode = false

[api]
# base_url = "https://api.hhhjobs.com"
dev_base_url = "http://localhost:5000"
page_origin = "http://localhost:5173"
timeout_ms = 30000

[storage]
token_key = "token"
user_key = "user"
path = ""  # empty keeps the session in memory

[routes]
login_path = "/login"
forbidden_path = "/unauthorized"

[guard]
# Admit a role to a path prefix without checking the session.
# bypass = [{ role = "hr", path_prefix = "/portal/hr" }]
bypass = []
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_toml_parses_to_defaults() {
        let config: PortalConfig = toml::from_str(&PortalConfig::example_toml()).unwrap();
        assert!(config.api.base_url.is_none());
        assert_eq!(config.api.dev_base_url, DEFAULT_DEV_API_BASE);
        assert_eq!(config.routes.login_path, "/login");
        assert!(config.guard.bypass.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bypass_rules_from_toml() {
        let config: PortalConfig = toml::from_str(
            r#"
[guard]
bypass = [{ role = "hr", path_prefix = "/portal/hr" }]
"#,
        )
        .unwrap();

        assert_eq!(
            config.guard.bypass,
            vec![BypassRuleConfig {
                role: Role::Hr,
                path_prefix: "/portal/hr".to_string()
            }]
        );
    }

    #[test]
    fn test_bypass_rule_parse() {
        let rule = BypassRuleConfig::parse("hr:/portal/hr").unwrap();
        assert_eq!(rule.role, Role::Hr);
        assert_eq!(rule.path_prefix, "/portal/hr");

        assert!(BypassRuleConfig::parse("hr").is_err());
    }

    #[test]
    fn test_validate_rejects_relative_paths() {
        let mut config = PortalConfig::default();
        config.routes.login_path = "login".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = PortalConfig::default();
        config.guard.bypass.push(BypassRuleConfig {
            role: Role::Hr,
            path_prefix: String::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_storage_key() {
        let mut config = PortalConfig::default();
        config.storage.user_key = config.storage.token_key.clone();
        assert!(config.validate().is_err());
    }
}
