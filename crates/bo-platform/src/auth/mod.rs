//! Credential Lifecycle
//!
//! Access tokens (HS256 JWT), Argon2 password hashing, rotating refresh
//! tokens bound to a device, and the access-token blacklist.

pub mod auth_api;
pub mod auth_service;
pub mod blacklist;
pub mod password_service;
pub mod refresh_token;
pub mod refresh_token_service;
pub mod session_service;
pub mod user_directory;

pub use auth_api::{auth_router, AuthApiState};
pub use auth_service::{extract_bearer_token, AccessTokenClaims, AuthConfig, AuthService, IssuedAccessToken};
pub use blacklist::TokenBlacklist;
pub use password_service::{Argon2Config, PasswordService};
pub use refresh_token::RefreshToken;
pub use refresh_token_service::RefreshTokenService;
pub use session_service::{LoginRateLimiter, SessionService, SessionTokens};
pub use user_directory::{MemoryUserDirectory, PgUserDirectory, RoleRef, UserAccount, UserDirectory};
