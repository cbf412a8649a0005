//! Failure taxonomy for the `/auth` endpoints and its HTTP mapping.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use super::{password::PasswordError, token::TokenError, types::ErrorEnvelope};
use crate::db::DbError;

const UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable, please retry later";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Too many login attempts, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("No session token presented")]
    TokenMissing,
    #[error("Session has been revoked")]
    TokenRevoked,
    #[error("Session token is invalid")]
    TokenMalformed,
    #[error("Session has expired")]
    TokenExpired,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("An account with this email already exists")]
    AccountExists,
    /// Database, hashing or signing failure. The detail is logged only.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl AuthError {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenMissing => "TOKEN_MISSING",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::TokenMalformed => "TOKEN_MALFORMED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::AccountExists => "ACCOUNT_EXISTS",
            Self::Infrastructure(_) => "INFRASTRUCTURE_FAILURE",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidCredentials
            | Self::TokenMissing
            | Self::TokenRevoked
            | Self::TokenMalformed
            | Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::AccountExists => StatusCode::CONFLICT,
            Self::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message safe to show to the client.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Infrastructure(_) => UNAVAILABLE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Missing => Self::TokenMissing,
            TokenError::Revoked => Self::TokenRevoked,
            TokenError::Malformed => Self::TokenMalformed,
            TokenError::Expired => Self::TokenExpired,
            TokenError::Signing(detail) => Self::Infrastructure(detail),
        }
    }
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        Self::Infrastructure(err.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        Self::Infrastructure(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Infrastructure(detail) = &self {
            error!("auth infrastructure failure: {detail}");
        }

        let status = self.status();
        let body = ErrorEnvelope::new(self.kind(), self.public_message());
        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::body::to_bytes;

    #[test]
    fn token_errors_map_to_401_kinds() {
        let cases = [
            (TokenError::Missing, "TOKEN_MISSING"),
            (TokenError::Revoked, "TOKEN_REVOKED"),
            (TokenError::Malformed, "TOKEN_MALFORMED"),
            (TokenError::Expired, "TOKEN_EXPIRED"),
        ];
        for (err, kind) in cases {
            let auth = AuthError::from(err);
            assert_eq!(auth.kind(), kind);
            assert_eq!(auth.status(), StatusCode::UNAUTHORIZED);
        }
        let signing = AuthError::from(TokenError::Signing("rng".to_string()));
        assert_eq!(signing.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn timeouts_become_infrastructure_failures() {
        let err = AuthError::from(DbError::Timeout(std::time::Duration::from_secs(5)));
        assert_eq!(err.kind(), "INFRASTRUCTURE_FAILURE");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn rate_limited_response_sets_retry_after() -> Result<()> {
        let response = AuthError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("42")
        );
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let envelope: ErrorEnvelope = serde_json::from_slice(&body)?;
        assert!(!envelope.success);
        assert_eq!(envelope.error.kind, "RATE_LIMITED");
        Ok(())
    }

    #[tokio::test]
    async fn infrastructure_detail_is_not_returned() -> Result<()> {
        let response =
            AuthError::Infrastructure("SELECT password_hash FROM users".to_string())
                .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let text = String::from_utf8(body.to_vec())?;
        assert!(!text.contains("SELECT"));
        assert!(text.contains("INFRASTRUCTURE_FAILURE"));
        Ok(())
    }
}
