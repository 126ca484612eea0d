//! Password Service
//!
//! Argon2id hashing and verification of login passwords.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::{debug, warn};

use crate::shared::error::{PlatformError, Result};

/// Argon2id cost parameters
#[derive(Debug, Clone)]
pub struct Argon2Config {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost: 19456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl Argon2Config {
    /// Low cost config for tests and dev seeding
    pub fn testing() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new(config: Argon2Config) -> Self {
        let params = Params::new(config.memory_cost, config.time_cost, config.parallelism, None).unwrap_or_else(|e| {
            warn!(error = %e, "Invalid Argon2 parameters, using defaults");
            Params::default()
        });

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// PHC-format Argon2id hash with a random salt
    pub fn hash_password(&self, password: &str) -> Result<String> {
        if password.is_empty() {
            return Err(PlatformError::validation("Password must not be empty"));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PlatformError::internal(format!("Failed to hash password: {}", e)))?;

        Ok(hash.to_string())
    }

    /// `Ok(false)` on a wrong password; `Err` only for a corrupt hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| PlatformError::internal(format!("Invalid password hash format: {}", e)))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => {
                debug!("Password verification failed");
                Ok(false)
            }
            Err(e) => Err(PlatformError::internal(format!("Password verification error: {}", e))),
        }
    }
}

impl Default for PasswordService {
    fn default() -> Self {
        Self::new(Argon2Config::default())
    }
}
