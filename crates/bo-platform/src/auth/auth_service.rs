//! Authentication Service
//!
//! Issues and validates HS256-signed access tokens. Each token carries a
//! fresh `jti` so it can be revoked individually through the blacklist.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::user_directory::UserAccount;
use crate::shared::error::{PlatformError, Result};
use crate::shared::tsid::TsidGenerator;

/// JWT claims for access tokens
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Issuer
    pub iss: String,

    /// Audience
    pub aud: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// JWT ID, checked against the blacklist on every request
    pub jti: String,

    /// Username
    #[serde(default)]
    pub unique_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Numeric role ids, one claim value per role
    #[serde(default)]
    pub roles: Vec<String>,

    /// `;`-separated role codes
    #[serde(default)]
    pub role_codes: String,

    /// Preferred language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    /// Device the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
}

impl AccessTokenClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

/// Configuration for the auth service
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for HS256
    pub secret_key: String,

    /// Token issuer
    pub issuer: String,

    /// Token audience
    pub audience: String,

    /// Access token expiration in seconds
    pub access_token_expiry_secs: i64,

    /// Refresh token expiration in seconds
    pub refresh_token_expiry_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            issuer: "backoffice".to_string(),
            audience: "backoffice".to_string(),
            access_token_expiry_secs: 900,
            refresh_token_expiry_secs: 86400 * 14,
        }
    }
}

/// A freshly signed access token
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service for token management
pub struct AuthService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret_key.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret_key.as_bytes());

        info!(issuer = %config.issuer, "AuthService initialized with HS256");

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Sign an access token for `user` bound to `device_id`
    pub fn issue_access_token(&self, user: &UserAccount, device_id: &str) -> Result<IssuedAccessToken> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.access_token_expiry_secs);
        let jti = TsidGenerator::generate();

        let claims = AccessTokenClaims {
            sub: user.id.clone(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: jti.clone(),
            unique_name: user.username.clone(),
            email: user.email.clone(),
            roles: user.roles.iter().map(|r| r.id.to_string()).collect(),
            role_codes: user.roles.iter().map(|r| r.code.as_str()).collect::<Vec<_>>().join(";"),
            lang: user.language.clone(),
            did: Some(device_id.to_string()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| PlatformError::internal(format!("Failed to encode JWT: {}", e)))?;

        Ok(IssuedAccessToken { token, jti, expires_at })
    }

    /// Verify signature, issuer, audience and expiry, then return the claims
    pub fn validate_token(&self, token: &str) -> Result<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.leeway = 0;

        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => PlatformError::TokenExpired,
                _ => PlatformError::invalid_token(e.to_string()),
            })
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.config.refresh_token_expiry_secs)
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user_directory::RoleRef;

    fn service() -> AuthService {
        AuthService::new(AuthConfig {
            secret_key: "unit-test-secret".to_string(),
            ..AuthConfig::default()
        })
    }

    fn user() -> UserAccount {
        UserAccount::new("U1", "jdoe", "")
            .with_email("jdoe@example.com")
            .with_role(RoleRef::new(3, "Editor"))
            .with_role(RoleRef::new(5, "Auditor"))
    }

    #[test]
    fn test_issue_and_validate_token() {
        let service = service();
        let issued = service.issue_access_token(&user(), "device-1").unwrap();

        let claims = service.validate_token(&issued.token).unwrap();
        assert_eq!(claims.sub, "U1");
        assert_eq!(claims.unique_name, "jdoe");
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.roles, vec!["3", "5"]);
        assert_eq!(claims.role_codes, "Editor;Auditor");
        assert_eq!(claims.did.as_deref(), Some("device-1"));
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn test_every_token_has_a_new_jti() {
        let service = service();
        let a = service.issue_access_token(&user(), "d").unwrap();
        let b = service.issue_access_token(&user(), "d").unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_rejects_foreign_signature() {
        let issued = service().issue_access_token(&user(), "d").unwrap();
        let other = AuthService::new(AuthConfig {
            secret_key: "another-secret".to_string(),
            ..AuthConfig::default()
        });

        assert!(matches!(
            other.validate_token(&issued.token),
            Err(PlatformError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_expired_token() {
        let service = AuthService::new(AuthConfig {
            secret_key: "unit-test-secret".to_string(),
            access_token_expiry_secs: -60,
            ..AuthConfig::default()
        });
        let issued = service.issue_access_token(&user(), "d").unwrap();

        assert!(matches!(service.validate_token(&issued.token), Err(PlatformError::TokenExpired)));
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("bearer abc123"), None);
        assert_eq!(extract_bearer_token("Basic abc123"), None);
    }
}
