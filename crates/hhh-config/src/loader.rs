//! Configuration loader with file and environment variable support

use crate::{BypassRuleConfig, ConfigError, PortalConfig};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "hhh.toml",
    "config.toml",
    "./config/hhh.toml",
    "./config/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<PortalConfig, ConfigError> {
        let mut config = PortalConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = PortalConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(?path, "Configured config file does not exist, searching defaults");
        }

        if let Ok(path) = env::var("HHH_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut PortalConfig) -> Result<(), ConfigError> {
        // API
        if let Ok(val) = env::var("HHH_API_BASE_URL") {
            let val = val.trim().to_string();
            config.api.base_url = if val.is_empty() { None } else { Some(val) };
        }
        if let Ok(val) = env::var("HHH_API_DEV_BASE_URL") {
            config.api.dev_base_url = val;
        }
        if let Ok(val) = env::var("HHH_PAGE_ORIGIN") {
            config.api.page_origin = val;
        }
        if let Ok(val) = env::var("HHH_API_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                config.api.timeout_ms = timeout;
            }
        }

        // Storage
        if let Ok(val) = env::var("HHH_STORAGE_PATH") {
            config.storage.path = val;
        }

        // Guard
        if let Ok(val) = env::var("HHH_GUARD_BYPASS") {
            config.guard.bypass = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(BypassRuleConfig::parse)
                .collect::<Result<Vec<_>, _>>()?;
        }

        // General
        if let Ok(val) = env::var("HHH_DEV_MODE") {
            config.dev_mode = val.parse().unwrap_or(false);
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
