//! Identity token lookup
//!
//! A request waits for a token with a bounded retry loop: a fixed delay
//! between lookups and a capped number of attempts. When no token shows up
//! the wait resolves to `None` and the request goes out anonymously.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Where the current identity token lives
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn current(&self) -> Option<String>;
}

/// Token slot shared between the login flow and the client
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(token.into()))),
        }
    }

    pub async fn set(&self, token: impl Into<String>) {
        *self.inner.write().await = Some(token.into());
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[async_trait]
impl TokenSource for SharedToken {
    async fn current(&self) -> Option<String> {
        self.inner.read().await.clone()
    }
}

/// Bounded wait over a [`TokenSource`]
#[derive(Clone)]
pub struct TokenProvider {
    source: Arc<dyn TokenSource>,
    attempts: u32,
    delay: Duration,
}

impl TokenProvider {
    pub fn new(source: Arc<dyn TokenSource>, attempts: u32, delay: Duration) -> Self {
        Self {
            source,
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Wait for a non-empty token; `None` once the attempts run out
    pub async fn wait_for_token(&self) -> Option<String> {
        for attempt in 1..=self.attempts {
            if let Some(token) = self.source.current().await.filter(|t| !t.is_empty()) {
                return Some(token);
            }
            if attempt < self.attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        debug!(attempts = self.attempts, "No identity token available");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        calls: AtomicU32,
        ready_after: u32,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn current(&self) -> Option<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            (call >= self.ready_after).then(|| "token".to_string())
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_capped_attempts() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            ready_after: u32::MAX,
        });
        let provider = TokenProvider::new(source.clone(), 3, Duration::from_millis(5));

        assert_eq!(provider.wait_for_token().await, None);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_once_token_appears() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            ready_after: 2,
        });
        let provider = TokenProvider::new(source.clone(), 5, Duration::from_millis(5));

        assert_eq!(provider.wait_for_token().await.as_deref(), Some("token"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_token_counts_as_missing() {
        let token = SharedToken::with_token("");
        let provider = TokenProvider::new(Arc::new(token.clone()), 2, Duration::from_millis(1));
        assert_eq!(provider.wait_for_token().await, None);

        token.set("abc").await;
        assert_eq!(provider.wait_for_token().await.as_deref(), Some("abc"));

        token.clear().await;
        assert_eq!(provider.wait_for_token().await, None);
    }
}
