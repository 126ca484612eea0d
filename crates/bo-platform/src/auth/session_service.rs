//! Session Service
//!
//! Login, refresh and logout on top of the token, password, refresh-token
//! and blacklist services.

use governor::{clock::Clock, clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::auth_service::{AccessTokenClaims, AuthService};
use super::blacklist::TokenBlacklist;
use super::password_service::PasswordService;
use super::refresh_token_service::RefreshTokenService;
use super::user_directory::{UserAccount, UserDirectory};
use crate::shared::error::{PlatformError, Result};
use crate::shared::tsid::TsidGenerator;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Checks between two sweeps of idle usernames
const PRUNE_EVERY: u64 = 1024;

/// Login attempts per username per minute.
///
/// Every username tried gets a slot; slots whose quota has fully refilled
/// are swept every [`PRUNE_EVERY`] checks.
pub struct LoginRateLimiter {
    limiter: KeyedLimiter,
    checks: AtomicU64,
}

impl LoginRateLimiter {
    pub fn per_minute(attempts: u32) -> Self {
        Self::new(Quota::per_minute(NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN)))
    }

    pub fn new(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::keyed(quota),
            checks: AtomicU64::new(0),
        }
    }

    /// Forget usernames whose quota is back to full
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        debug!(tracked = self.limiter.len(), "Login rate limiter pruned");
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }

    /// `TooManyRequests` with a retry hint once the quota is spent
    pub fn check(&self, username: &str) -> Result<()> {
        let key = username.trim().to_lowercase();
        let result = self.limiter.check_key(&key);
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }

        result.map_err(|not_until| {
            let retry_after_secs = not_until.wait_time_from(DefaultClock::default().now()).as_secs().max(1);
            warn!(username = %key, retry_after_secs, "Login rate limit exceeded");
            PlatformError::TooManyRequests {
                message: "Too many login attempts".to_string(),
                retry_after_secs,
            }
        })
    }
}

/// Credential pair returned by login and refresh
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub device_id: String,
}

pub struct SessionService {
    auth_service: Arc<AuthService>,
    users: Arc<dyn UserDirectory>,
    passwords: Arc<PasswordService>,
    refresh_tokens: Arc<RefreshTokenService>,
    blacklist: Arc<TokenBlacklist>,
    login_limiter: LoginRateLimiter,
}

impl SessionService {
    pub fn new(
        auth_service: Arc<AuthService>,
        users: Arc<dyn UserDirectory>,
        passwords: Arc<PasswordService>,
        refresh_tokens: Arc<RefreshTokenService>,
        blacklist: Arc<TokenBlacklist>,
        login_limiter: LoginRateLimiter,
    ) -> Self {
        Self {
            auth_service,
            users,
            passwords,
            refresh_tokens,
            blacklist,
            login_limiter,
        }
    }

    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        &self.users
    }

    /// Verify credentials and open a session for `device_id` (a new device
    /// id is generated when none is given)
    pub async fn login(&self, username: &str, password: &str, device_id: Option<&str>) -> Result<SessionTokens> {
        self.login_limiter.check(username)?;

        let Some(user) = self.users.find_by_username(username.trim()).await? else {
            warn!(username, "Login failed: unknown user");
            return Err(PlatformError::InvalidCredentials);
        };
        if !user.is_active {
            warn!(user_id = %user.id, "Login failed: account inactive");
            return Err(PlatformError::InvalidCredentials);
        }
        if !self.passwords.verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(PlatformError::InvalidCredentials);
        }

        let device_id = device_id
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(TsidGenerator::generate);

        let tokens = self.open_session(&user, &device_id).await?;
        info!(user_id = %user.id, device_id = %device_id, "User logged in");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair; the old refresh value dies
    pub async fn refresh(&self, refresh_token: &str, device_id: Option<&str>) -> Result<SessionTokens> {
        let record = self.refresh_tokens.exchange(refresh_token, device_id).await?;

        let user = match self.users.find_by_id(&record.user_id).await? {
            Some(user) if user.is_active => user,
            _ => {
                warn!(user_id = %record.user_id, "Refresh rejected: account missing or inactive");
                return Err(PlatformError::unauthorized("Account is not active"));
            }
        };

        let access = self.auth_service.issue_access_token(&user, &record.device_id)?;
        let device_id = record.device_id.clone();
        let refresh_token = self.refresh_tokens.rotate(record, refresh_token, &access.jti).await?;

        debug!(user_id = %user.id, device_id = %device_id, "Session refreshed");
        Ok(self.session_tokens(access.token, refresh_token, device_id))
    }

    /// Blacklist the presented access token and revoke the refresh tokens of
    /// `device_ids` (the token's own device when empty). Returns the number of
    /// refresh tokens revoked.
    pub async fn logout(&self, claims: &AccessTokenClaims, device_ids: Vec<String>) -> Result<usize> {
        self.blacklist.revoke(&claims.jti, claims.expires_at());

        let devices = if device_ids.is_empty() {
            claims.did.iter().cloned().collect()
        } else {
            device_ids
        };
        let revoked = self.refresh_tokens.revoke_devices(&claims.sub, &devices).await?;

        info!(user_id = %claims.sub, revoked, "User logged out");
        Ok(revoked)
    }

    async fn open_session(&self, user: &UserAccount, device_id: &str) -> Result<SessionTokens> {
        let access = self.auth_service.issue_access_token(user, device_id)?;
        let refresh_token = self.refresh_tokens.issue(&user.id, device_id, &access.jti).await?;
        Ok(self.session_tokens(access.token, refresh_token, device_id.to_string()))
    }

    fn session_tokens(&self, access_token: String, refresh_token: String, device_id: String) -> SessionTokens {
        SessionTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.auth_service.config().access_token_expiry_secs,
            device_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_refill() -> LoginRateLimiter {
        LoginRateLimiter::new(Quota::with_period(Duration::from_millis(1)).unwrap())
    }

    #[tokio::test]
    async fn test_refilled_usernames_are_pruned() {
        let limiter = fast_refill();
        for i in 0..10 {
            limiter.check(&format!("user{}", i)).unwrap();
        }
        assert_eq!(limiter.tracked_keys(), 10);

        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.prune();
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_checks_sweep_periodically() {
        let limiter = fast_refill();
        for i in 0..PRUNE_EVERY - 1 {
            limiter.check(&format!("user{}", i)).unwrap();
        }
        assert_eq!(limiter.tracked_keys(), (PRUNE_EVERY - 1) as usize);

        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.check("last").unwrap();
        // only the username checked just now is still cooling down
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_rate_limit_is_per_username() {
        let limiter = LoginRateLimiter::per_minute(2);

        assert!(limiter.check("alice").is_ok());
        assert!(limiter.check("ALICE").is_ok());
        let err = limiter.check("alice").unwrap_err();
        assert!(matches!(err, PlatformError::TooManyRequests { retry_after_secs, .. } if retry_after_secs >= 1));

        assert!(limiter.check("bob").is_ok());
    }
}
