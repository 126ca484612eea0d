//! Backoffice Configuration System
//!
//! TOML-based configuration with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// The database url that selects the in-process store
pub const MEMORY_DATABASE_URL: &str = "memory";

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

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,

    /// Enable development mode (in-memory store, seeded admin account)
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            cache: CacheConfig::default(),
            dev_mode: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["http://localhost:4200".to_string()],
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection url, or `memory`
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/backoffice".to_string(),
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.eq_ignore_ascii_case(MEMORY_DATABASE_URL)
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HMAC secret used to sign access tokens
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_secs: u64,
    pub refresh_token_expiry_secs: u64,
    /// Role code that bypasses every permission check
    pub super_admin_code: String,
    /// Login attempts allowed per username per minute
    pub login_attempts_per_minute: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "backoffice".to_string(),
            audience: "backoffice".to_string(),
            access_token_expiry_secs: 900,       // 15 minutes
            refresh_token_expiry_secs: 1209600,  // 14 days
            super_admin_code: "SuperAdmin".to_string(),
            login_attempts_per_minute: 10,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Upper bound on entries; 0 means unbounded
    pub max_entries: usize,
    /// Default TTL for parameterized reads; 0 means no expiry
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl_secs: 300,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject settings the server cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() && !self.dev_mode {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret must be set outside dev mode".to_string(),
            ));
        }
        if self.auth.access_token_expiry_secs == 0 || self.auth.refresh_token_expiry_secs == 0 {
            return Err(ConfigError::ValidationError(
                "token expiry must be greater than zero".to_string(),
            ));
        }
        if self.auth.super_admin_code.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.super_admin_code must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Backoffice Configuration
# Environment variables (BACKOFFICE_*) override these settings

dev_mode = false

[http]
port = 8080
host = "0.0.0.0"
cors_origins = ["http://localhost:4200"]

[database]
url = "postgres://localhost:5432/backoffice"  # or "memory"
max_connections = 10

[auth]
jwt_secret = ""
issuer = "backoffice"
audience = "backoffice"
access_token_expiry_secs = 900
refresh_token_expiry_secs = 1209600
super_admin_code = "SuperAdmin"
login_attempts_per_minute = 10

[cache]
max_entries = 10000
default_ttl_secs = 300
"#
        .to_string()
    }
}
