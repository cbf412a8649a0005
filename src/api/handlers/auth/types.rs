//! Request/response types for the `/auth` endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::storage::PublicUser;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Login,
    Register,
}

/// Body of `POST /auth`. `name` is only read for registration.
#[derive(ToSchema, Deserialize)]
pub struct AuthRequest {
    pub mode: AuthMode,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("mode", &self.mode)
            .field("email", &self.email)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Identity decoded from a valid session token.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    /// Stable machine-readable kind, e.g. `RATE_LIMITED`.
    pub kind: String,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    #[must_use]
    pub fn new(kind: &str, message: String) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                kind: kind.to_string(),
                message,
            },
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserEnvelope {
    pub success: bool,
    pub data: PublicUser,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionEnvelope {
    pub success: bool,
    pub data: SessionIdentity,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub success: bool,
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_parses_without_name() -> Result<()> {
        let request: AuthRequest = serde_json::from_str(
            r#"{"mode":"login","email":"user@example.com","password":"hunter22"}"#,
        )?;
        assert_eq!(request.mode, AuthMode::Login);
        assert_eq!(request.email, "user@example.com");
        assert!(request.name.is_none());
        Ok(())
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let result: Result<AuthRequest, _> =
            serde_json::from_str(r#"{"mode":"reset","email":"a@b.c","password":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn debug_never_prints_the_password() {
        let request = AuthRequest {
            mode: AuthMode::Login,
            email: "user@example.com".to_string(),
            password: "super-secret-value".to_string(),
            name: None,
        };
        assert!(!format!("{request:?}").contains("super-secret-value"));
    }

    #[test]
    fn error_envelope_shape() -> Result<()> {
        let value = serde_json::to_value(ErrorEnvelope::new(
            "RATE_LIMITED",
            "slow down".to_string(),
        ))?;
        assert_eq!(value.get("success"), Some(&serde_json::Value::Bool(false)));
        let kind = value
            .pointer("/error/kind")
            .and_then(serde_json::Value::as_str)
            .context("missing kind")?;
        assert_eq!(kind, "RATE_LIMITED");
        Ok(())
    }
}
