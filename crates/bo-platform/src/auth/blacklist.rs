//! Access token blacklist
//!
//! Revoked `jti`s are kept in the shared cache until the token would have
//! expired anyway. Entries are pinned so capacity pressure can't evict them.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::{cache_key, CacheEntryOptions, CachePriority, CacheStore};

const BLACKLIST_PREFIX: &str = "Blacklist";

pub struct TokenBlacklist {
    cache: Arc<CacheStore>,
}

impl TokenBlacklist {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self { cache }
    }

    /// Blacklist `jti` until `expires_at` (at least one second)
    pub fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) {
        let remaining = (expires_at - Utc::now()).to_std().unwrap_or_default();
        let ttl = remaining.max(Duration::from_secs(1));

        let options = CacheEntryOptions {
            ttl: Some(ttl),
            priority: CachePriority::NeverRemove,
        };
        self.cache.set(cache_key(BLACKLIST_PREFIX, jti), (), options);
        info!(jti, ttl_secs = ttl.as_secs(), "Access token blacklisted");
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.cache.contains(&cache_key(BLACKLIST_PREFIX, jti))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_revoke_until_expiry() {
        let cache = Arc::new(CacheStore::new());
        let blacklist = TokenBlacklist::new(Arc::clone(&cache));

        assert!(!blacklist.is_revoked("J1"));
        blacklist.revoke("J1", Utc::now() + ChronoDuration::minutes(5));

        assert!(blacklist.is_revoked("J1"));
        assert!(!blacklist.is_revoked("J2"));
        assert!(cache.contains("Blacklist_J1"));
    }

    #[test]
    fn test_already_expired_token_still_listed_briefly() {
        let blacklist = TokenBlacklist::new(Arc::new(CacheStore::new()));
        blacklist.revoke("J1", Utc::now() - ChronoDuration::minutes(5));
        assert!(blacklist.is_revoked("J1"));
    }

    #[test]
    fn test_prefix_invalidation_of_entities_leaves_blacklist_alone() {
        let cache = Arc::new(CacheStore::new());
        let blacklist = TokenBlacklist::new(Arc::clone(&cache));
        blacklist.revoke("J1", Utc::now() + ChronoDuration::minutes(5));

        cache.invalidate_prefix("Department_");
        assert!(blacklist.is_revoked("J1"));
    }
}
