//! Session token issuance and validation.
//!
//! Tokens are compact HS256 JWTs (`jsonwebtoken`). Claims carry the subject,
//! issue/expiry times and a random 128-bit `jti` so a single token can be
//! revoked without tracking subjects. Expiry is checked against the injected
//! clock rather than by the JWT library, after the revocation check.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;

use super::{clock::Clock, revocation::RevocationList};

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
pub const MIN_SECRET_LEN: usize = 32;
const TOKEN_ID_BYTES: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("no session token presented")]
    Missing,
    #[error("session token has been revoked")]
    Revoked,
    #[error("session token is malformed or its signature is invalid")]
    Malformed,
    #[error("session token has expired")]
    Expired,
    #[error("failed to sign session token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SessionClaims {
    /// Subject (account id).
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: SessionClaims,
}

/// HMAC key shared by the issuer and the validator.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(***)")
    }
}

impl SigningKey {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }
}

fn generate_token_id() -> Result<String, TokenError> {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| TokenError::Signing(err.to_string()))?;
    Ok(bytes
        .iter()
        .fold(String::with_capacity(TOKEN_ID_BYTES * 2), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        }))
}

#[derive(Clone)]
pub struct TokenIssuer {
    key: SigningKey,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(key: SigningKey, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { key, ttl, clock }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a signed token for `subject_id`.
    ///
    /// # Errors
    /// Returns `TokenError::Signing` if randomness or signing fails.
    pub fn issue(&self, subject_id: &str) -> Result<IssuedToken, TokenError> {
        let issued_at = self.clock.now();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = SessionClaims {
            sub: subject_id.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(ttl),
            jti: generate_token_id()?,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.key.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))?;

        Ok(IssuedToken { token, claims })
    }
}

#[derive(Clone)]
pub struct TokenValidator {
    key: SigningKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
    revocations: Arc<RevocationList>,
}

impl TokenValidator {
    #[must_use]
    pub fn new(key: SigningKey, clock: Arc<dyn Clock>, revocations: Arc<RevocationList>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is decided by `clock` after the revocation check.
        validation.validate_exp = false;
        validation.validate_aud = false;
        Self {
            key,
            validation,
            clock,
            revocations,
        }
    }

    /// Validate a presented token.
    ///
    /// # Errors
    /// `Missing` when nothing was presented, `Malformed` for decoding or
    /// signature failures, `Revoked` for revoked ids and `Expired` once
    /// `now >= exp`.
    pub fn validate(&self, token: Option<&str>) -> Result<SessionClaims, TokenError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(TokenError::Missing)?;

        let claims = decode::<SessionClaims>(token, &self.key.decoding, &self.validation)
            .map_err(|err| {
                debug!(kind = ?err.kind(), "session token rejected");
                TokenError::Malformed
            })?
            .claims;

        if self.revocations.is_revoked(&claims.jti) {
            return Err(TokenError::Revoked);
        }

        if self.clock.now() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
