//! Refresh Token Service
//!
//! Issue, exchange and revoke per-device refresh tokens. Records live in the
//! generic `refresh_tokens` store; a device never has more than one live row.

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::refresh_token::RefreshToken;
use crate::data::{Filter, GenericService};
use crate::shared::error::{PlatformError, Result};

pub struct RefreshTokenService {
    tokens: GenericService<RefreshToken>,
    ttl: Duration,
}

impl RefreshTokenService {
    pub fn new(tokens: GenericService<RefreshToken>, ttl: Duration) -> Self {
        Self { tokens, ttl }
    }

    fn device_filter(user_id: &str, device_id: &str) -> Filter<RefreshToken> {
        RefreshToken::USER_ID
            .eq(user_id)
            .and(RefreshToken::DEVICE_ID.eq(device_id))
            .and(Filter::not_deleted())
    }

    /// Issue a new raw refresh token for `(user_id, device_id)`.
    ///
    /// An existing live record for the device is overwritten, which makes
    /// its previous raw value unusable.
    pub async fn issue(&self, user_id: &str, device_id: &str, access_token_id: &str) -> Result<String> {
        let raw = RefreshToken::generate_raw_token();
        let hash = RefreshToken::hash_token(&raw);
        let expires_at = Utc::now() + self.ttl;

        let existing: Option<RefreshToken> = self.tokens.get_single(&Self::device_filter(user_id, device_id)).await?;
        match existing {
            Some(mut record) => {
                record.token_hash = Some(hash);
                record.access_token_id = access_token_id.to_string();
                record.expires_at = expires_at;
                self.tokens.update(record, Some(user_id)).await?;
                debug!(user_id, device_id, "Refresh token rotated");
            }
            None => {
                let record = RefreshToken::new(user_id, device_id, hash, access_token_id, expires_at);
                self.tokens.create(record, Some(user_id)).await?;
                debug!(user_id, device_id, "Refresh token issued");
            }
        }

        Ok(raw)
    }

    fn live_hash_filter(hash: String) -> Filter<RefreshToken> {
        RefreshToken::TOKEN_HASH.eq(hash).and(Filter::not_deleted())
    }

    /// Look up the live record for a raw token.
    ///
    /// Revoked records have no hash, so revoked and superseded values are
    /// both simply unknown. When `device_id` is given it must match the
    /// device the token was issued to.
    pub async fn exchange(&self, raw_token: &str, device_id: Option<&str>) -> Result<RefreshToken> {
        let hash = RefreshToken::hash_token(raw_token);
        let record: Option<RefreshToken> = self.tokens.get_single(&Self::live_hash_filter(hash)).await?;

        let Some(record) = record else {
            warn!("Unknown, revoked or superseded refresh token presented");
            return Err(PlatformError::invalid_token("Invalid refresh token"));
        };

        if record.is_expired() {
            return Err(PlatformError::TokenExpired);
        }
        if let Some(device_id) = device_id {
            if device_id != record.device_id {
                warn!(user_id = %record.user_id, device_id, "Refresh token presented from another device");
                return Err(PlatformError::invalid_token("Invalid refresh token"));
            }
        }

        Ok(record)
    }

    /// Replace the token of `record`, found by [`exchange`](Self::exchange)
    /// for `presented`, with a new raw value.
    ///
    /// The write only lands while the stored hash is still the one of
    /// `presented`, so of several concurrent rotations of one token exactly
    /// one succeeds; the rest fail as invalid.
    pub async fn rotate(&self, mut record: RefreshToken, presented: &str, access_token_id: &str) -> Result<String> {
        let raw = RefreshToken::generate_raw_token();
        let expected = Self::live_hash_filter(RefreshToken::hash_token(presented));
        let user_id = record.user_id.clone();
        let device_id = record.device_id.clone();

        record.token_hash = Some(RefreshToken::hash_token(&raw));
        record.access_token_id = access_token_id.to_string();
        record.expires_at = Utc::now() + self.ttl;

        if !self.tokens.update_if(record, &expected, Some(&user_id)).await? {
            warn!(user_id = %user_id, device_id = %device_id, "Refresh token reused while being rotated");
            return Err(PlatformError::invalid_token("Invalid refresh token"));
        }

        debug!(user_id = %user_id, device_id = %device_id, "Refresh token rotated");
        Ok(raw)
    }

    /// Clear and soft-delete the refresh records of the listed devices.
    /// Returns how many records were revoked.
    pub async fn revoke_devices(&self, user_id: &str, device_ids: &[String]) -> Result<usize> {
        if device_ids.is_empty() {
            return Ok(0);
        }

        let filter = RefreshToken::USER_ID
            .eq(user_id)
            .and(RefreshToken::DEVICE_ID.is_in(device_ids.iter().cloned()))
            .and(Filter::not_deleted());
        let records: Vec<RefreshToken> = self.tokens.find(&filter).await?;

        let mut revoked = 0;
        for mut record in records {
            let id = record.id.clone();
            record.token_hash = None;
            self.tokens.update(record, Some(user_id)).await?;
            self.tokens.soft_delete(&id, Some(user_id)).await?;
            revoked += 1;
        }

        debug!(user_id, revoked, "Refresh tokens revoked");
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::data::MemoryRepository;
    use std::sync::Arc;

    fn service(ttl: Duration) -> RefreshTokenService {
        let tokens = GenericService::new(
            Arc::new(MemoryRepository::<RefreshToken>::new()),
            Arc::new(CacheStore::new()),
        );
        RefreshTokenService::new(tokens, ttl)
    }

    #[tokio::test]
    async fn test_one_live_record_per_device() {
        let service = service(Duration::days(1));

        let first = service.issue("U1", "web", "J1").await.unwrap();
        let second = service.issue("U1", "web", "J2").await.unwrap();
        service.issue("U1", "mobile", "J3").await.unwrap();

        assert!(matches!(
            service.exchange(&first, None).await,
            Err(PlatformError::InvalidToken { .. })
        ));
        let record = service.exchange(&second, Some("web")).await.unwrap();
        assert_eq!(record.access_token_id, "J2");

        let live: Vec<RefreshToken> = service
            .tokens
            .find(&RefreshToken::USER_ID.eq("U1").and(Filter::not_deleted()))
            .await
            .unwrap();
        assert_eq!(live.len(), 2);
    }

    #[tokio::test]
    async fn test_exchange_checks_device_and_expiry() {
        let service = service(Duration::days(1));
        let raw = service.issue("U1", "web", "J1").await.unwrap();
        assert!(service.exchange(&raw, Some("mobile")).await.is_err());

        let expired = RefreshTokenService::new(service.tokens.clone(), Duration::seconds(-1));
        let stale = expired.issue("U2", "web", "J9").await.unwrap();
        assert!(matches!(expired.exchange(&stale, None).await, Err(PlatformError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_concurrent_rotations_of_one_token_admit_one() {
        let service = service(Duration::days(1));
        let raw = service.issue("U1", "web", "J1").await.unwrap();

        // both callers pass the lookup before either rotates
        let a = service.exchange(&raw, Some("web")).await.unwrap();
        let b = service.exchange(&raw, Some("web")).await.unwrap();

        let (first, second) = tokio::join!(service.rotate(a, &raw, "J2"), service.rotate(b, &raw, "J3"));
        let rotated: Vec<String> = [first, second].into_iter().filter_map(|r| r.ok()).collect();
        assert_eq!(rotated.len(), 1);

        assert!(service.exchange(&raw, None).await.is_err());
        assert!(service.exchange(&rotated[0], Some("web")).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoked_token_is_unknown() {
        let service = service(Duration::days(1));
        let raw = service.issue("U1", "web", "J1").await.unwrap();
        service.revoke_devices("U1", &["web".to_string()]).await.unwrap();

        assert!(matches!(
            service.exchange(&raw, None).await,
            Err(PlatformError::InvalidToken { .. })
        ));
    }

    #[tokio::test]
    async fn test_revoke_devices() {
        let service = service(Duration::days(1));
        let web = service.issue("U1", "web", "J1").await.unwrap();
        let mobile = service.issue("U1", "mobile", "J2").await.unwrap();

        let revoked = service.revoke_devices("U1", &["web".to_string()]).await.unwrap();
        assert_eq!(revoked, 1);
        assert!(service.exchange(&web, None).await.is_err());
        assert!(service.exchange(&mobile, None).await.is_ok());

        // nothing left to revoke on the second call
        assert_eq!(service.revoke_devices("U1", &["web".to_string()]).await.unwrap(), 0);
    }
}
