//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "backoffice.toml",
    "./config/config.toml",
    "/etc/backoffice/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
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
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_env_overrides(&mut config, |key| env::var(key).ok());

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("BACKOFFICE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `BACKOFFICE_*` overrides; unparsable numbers leave the value untouched
fn apply_env_overrides<F>(config: &mut AppConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    // HTTP
    if let Some(port) = var("BACKOFFICE_HTTP_PORT").and_then(|v| v.parse().ok()) {
        config.http.port = port;
    }
    if let Some(val) = var("BACKOFFICE_HTTP_HOST") {
        config.http.host = val;
    }
    if let Some(val) = var("BACKOFFICE_CORS_ORIGINS") {
        config.http.cors_origins = val.split(',').map(|s| s.trim().to_string()).collect();
    }

    // Database
    if let Some(val) = var("BACKOFFICE_DATABASE_URL") {
        config.database.url = val;
    }
    if let Some(max) = var("BACKOFFICE_DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
        config.database.max_connections = max;
    }

    // Auth
    if let Some(val) = var("BACKOFFICE_JWT_SECRET") {
        config.auth.jwt_secret = val;
    }
    if let Some(val) = var("BACKOFFICE_JWT_ISSUER") {
        config.auth.issuer = val;
    }
    if let Some(val) = var("BACKOFFICE_JWT_AUDIENCE") {
        config.auth.audience = val;
    }
    if let Some(secs) = var("BACKOFFICE_ACCESS_TOKEN_EXPIRY_SECS").and_then(|v| v.parse().ok()) {
        config.auth.access_token_expiry_secs = secs;
    }
    if let Some(secs) = var("BACKOFFICE_REFRESH_TOKEN_EXPIRY_SECS").and_then(|v| v.parse().ok()) {
        config.auth.refresh_token_expiry_secs = secs;
    }
    if let Some(val) = var("BACKOFFICE_SUPER_ADMIN_CODE") {
        config.auth.super_admin_code = val;
    }
    if let Some(n) = var("BACKOFFICE_LOGIN_ATTEMPTS_PER_MINUTE").and_then(|v| v.parse().ok()) {
        config.auth.login_attempts_per_minute = n;
    }

    // Cache
    if let Some(n) = var("BACKOFFICE_CACHE_MAX_ENTRIES").and_then(|v| v.parse().ok()) {
        config.cache.max_entries = n;
    }
    if let Some(n) = var("BACKOFFICE_CACHE_DEFAULT_TTL_SECS").and_then(|v| v.parse().ok()) {
        config.cache.default_ttl_secs = n;
    }

    // General
    if let Some(val) = var("BACKOFFICE_DEV_MODE") {
        config.dev_mode = val.parse().unwrap_or(false);
    }
}
