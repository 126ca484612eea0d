//! Refresh Token Entity
//!
//! One record per `(user, device)`. The raw token is handed to the client
//! once; only its SHA-256 hash is stored. Issuing again for the same device
//! overwrites the hash, so the previous raw value stops working.

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::data::{Audit, Column, Entity, SqlValue};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    /// TSID
    pub id: String,
    pub user_id: String,
    pub device_id: String,
    /// `None` once the token has been revoked
    #[serde(skip_serializing)]
    pub token_hash: Option<String>,
    /// `jti` of the access token issued alongside
    pub access_token_id: String,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

impl RefreshToken {
    pub const USER_ID: Column<RefreshToken, String> = Column::new("user_id");
    pub const DEVICE_ID: Column<RefreshToken, String> = Column::new("device_id");
    pub const TOKEN_HASH: Column<RefreshToken, Option<String>> = Column::new("token_hash");

    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        token_hash: impl Into<String>,
        access_token_id: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            device_id: device_id.into(),
            token_hash: Some(token_hash.into()),
            access_token_id: access_token_id.into(),
            expires_at,
            audit: Audit::default(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Usable for an exchange: not revoked, not deleted, not expired
    pub fn is_active(&self) -> bool {
        self.token_hash.is_some() && !self.audit.is_deleted && !self.is_expired()
    }

    /// Cryptographically random, URL-safe token string
    pub fn generate_raw_token() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Hash a raw token for storage and lookup
    pub fn hash_token(raw_token: &str) -> String {
        let hash = Sha256::digest(raw_token.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
    }
}

impl Entity for RefreshToken {
    type Key = String;
    const TABLE: &'static str = "refresh_tokens";
    const CACHE_PREFIX: &'static str = "RefreshToken";

    fn id(&self) -> &String {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn columns() -> &'static [&'static str] {
        &["user_id", "device_id", "token_hash", "access_token_id", "expires_at"]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.user_id.as_str().into(),
            self.device_id.as_str().into(),
            self.token_hash.clone().into(),
            self.access_token_id.as_str().into(),
            self.expires_at.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_token_hashing() {
        let raw = RefreshToken::generate_raw_token();
        assert_eq!(RefreshToken::hash_token(&raw), RefreshToken::hash_token(&raw));
        assert_ne!(raw, RefreshToken::hash_token(&raw));

        let other = RefreshToken::generate_raw_token();
        assert_ne!(RefreshToken::hash_token(&raw), RefreshToken::hash_token(&other));
    }

    #[test]
    fn test_activity() {
        let mut token = RefreshToken::new("U1", "web", "h", "jti", Utc::now() + Duration::hours(1));
        assert!(token.is_active());

        token.token_hash = None;
        assert!(!token.is_active());

        let expired = RefreshToken::new("U1", "web", "h", "jti", Utc::now() - Duration::seconds(1));
        assert!(expired.is_expired());
        assert!(!expired.is_active());
    }

    #[test]
    fn test_field_lookup_includes_hash() {
        let token = RefreshToken::new("U1", "web", "h", "jti", Utc::now());
        assert_eq!(token.field("token_hash"), Some(SqlValue::from("h")));
        assert_eq!(token.field("is_deleted"), Some(SqlValue::from(false)));
    }
}
