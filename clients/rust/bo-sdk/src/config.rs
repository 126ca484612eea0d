//! SDK Configuration

use std::time::Duration;

/// Configuration for [`crate::ApiClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the platform server
    pub base_url: String,

    /// Request timeout
    pub timeout: Duration,

    /// How many times to look for an identity token before giving up
    pub token_wait_attempts: u32,

    /// Fixed delay between token lookups
    pub token_wait_delay: Duration,

    /// User agent string
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
            token_wait_attempts: 10,
            token_wait_delay: Duration::from_millis(100),
            user_agent: format!("Backoffice-Rust-SDK/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the bounded token wait
    pub fn with_token_wait(mut self, attempts: u32, delay: Duration) -> Self {
        self.token_wait_attempts = attempts;
        self.token_wait_delay = delay;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}
