//! Argon2id password hashing.
//!
//! Verification for unknown accounts runs against a dummy hash computed at
//! startup so both failure paths cost the same.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use std::sync::Arc;
use thiserror::Error;

const DUMMY_PASSWORD: &str = "mission-auth-dummy-password";

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("password task failed: {0}")]
    Task(String),
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct PasswordCost {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordCost {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

impl PasswordHasher {
    /// # Errors
    /// Returns an error if the cost parameters are rejected by Argon2.
    pub fn new(cost: PasswordCost) -> Result<Self, PasswordError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|err| PasswordError::Hash(err.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut hasher = Self {
            argon2,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(hasher)
    }

    /// Hash a password into a PHC string.
    ///
    /// # Errors
    /// Returns `PasswordError::Hash` if hashing fails.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| PasswordError::Hash(err.to_string()))
    }

    /// Verify `password` against a stored hash, or against the dummy hash
    /// when no account exists. Always `false` for the dummy path.
    ///
    /// # Errors
    /// Returns `PasswordError::Hash` when the stored hash cannot be parsed.
    pub fn verify(&self, password: &str, stored_hash: Option<&str>) -> Result<bool, PasswordError> {
        let target = stored_hash.unwrap_or(&self.dummy_hash);
        let parsed =
            PasswordHash::new(target).map_err(|err| PasswordError::Hash(err.to_string()))?;
        let matches = match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => true,
            Err(argon2::password_hash::Error::Password) => false,
            Err(err) => return Err(PasswordError::Hash(err.to_string())),
        };
        Ok(matches && stored_hash.is_some())
    }
}

/// Run [`PasswordHasher::hash`] on the blocking pool.
///
/// # Errors
/// Returns an error if hashing fails or the task panics.
pub async fn hash_blocking(
    hasher: Arc<PasswordHasher>,
    password: String,
) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|err| PasswordError::Task(err.to_string()))?
}

/// Run [`PasswordHasher::verify`] on the blocking pool.
///
/// # Errors
/// Returns an error if the stored hash is invalid or the task panics.
pub async fn verify_blocking(
    hasher: Arc<PasswordHasher>,
    password: String,
    stored_hash: Option<String>,
) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || hasher.verify(&password, stored_hash.as_deref()))
        .await
        .map_err(|err| PasswordError::Task(err.to_string()))?
}

#[cfg(test)]
pub(crate) fn test_cost() -> PasswordCost {
    PasswordCost {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}
