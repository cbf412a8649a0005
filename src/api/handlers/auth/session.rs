//! Session endpoints and `token` cookie handling.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    error::AuthError,
    state::AuthState,
    types::{ErrorEnvelope, MessageEnvelope, SessionEnvelope, SessionIdentity},
};

pub(crate) const SESSION_COOKIE_NAME: &str = "token";

#[utoipa::path(
    get,
    path = "/auth",
    responses(
        (status = 200, description = "Session is valid", body = SessionEnvelope),
        (status = 401, description = "Token missing, malformed, revoked or expired; cookie cleared", body = ErrorEnvelope),
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    let token = extract_session_token(&headers);
    let claims = match auth_state.validator().validate(token.as_deref()) {
        Ok(claims) => claims,
        Err(err) => {
            debug!("session rejected: {err}");
            // Never leave a known-bad token in the client.
            return with_cleared_cookie(AuthError::from(err).into_response());
        }
    };

    // The identity comes from the token; the display name is best effort.
    let user = match auth_state.users().find_public_by_id(&claims.sub).await {
        Ok(user) => user,
        Err(err) => {
            warn!("Failed to load display name: {err}");
            None
        }
    };

    let identity = SessionIdentity {
        id: claims.sub,
        name: user.as_ref().map(|user| user.name.clone()),
        email: user.map(|user| user.email),
        issued_at: claims.iat,
        expires_at: claims.exp,
    };

    (
        StatusCode::OK,
        Json(SessionEnvelope {
            success: true,
            data: identity,
        }),
    )
        .into_response()
}

#[utoipa::path(
    delete,
    path = "/auth",
    responses(
        (status = 200, description = "Session revoked and cookie cleared", body = MessageEnvelope),
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    let token = extract_session_token(&headers);
    match auth_state.validator().validate(token.as_deref()) {
        Ok(claims) => {
            auth_state.revocations().revoke(&claims.jti, claims.exp);
            info!(subject = %claims.sub, "session revoked");
        }
        Err(err) => debug!("logout without a valid session: {err}"),
    }

    // Always clear the cookie, even when nothing was revoked.
    with_cleared_cookie(
        (
            StatusCode::OK,
            Json(MessageEnvelope {
                success: true,
                data: "Logged out".to_string(),
            }),
        )
            .into_response(),
    )
}

fn with_cleared_cookie(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(SET_COOKIE, clear_session_cookie());
    response
}

/// Build the `token` cookie carrying a freshly issued session token.
pub(super) fn session_cookie(token: &str, max_age: u64) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={token}; Secure; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age}"
    ))
}

pub(super) fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("token=; Secure; HttpOnly; SameSite=Strict; Path=/; Max-Age=0")
}

pub(super) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == SESSION_COOKIE_NAME).then(|| val.trim().to_string())
        })
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn session_cookie_format() -> Result<()> {
        let cookie = session_cookie("abc.def.ghi", 900)?;
        assert_eq!(
            cookie.to_str()?,
            "token=abc.def.ghi; Secure; HttpOnly; SameSite=Strict; Path=/; Max-Age=900"
        );
        Ok(())
    }

    #[test]
    fn clear_cookie_expires_immediately() -> Result<()> {
        let cookie = clear_session_cookie();
        assert!(cookie.to_str()?.starts_with("token=;"));
        assert!(cookie.to_str()?.ends_with("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn extract_token_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; token=abc.def.ghi; lang=en"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn extract_token_ignores_lookalike_names_and_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("xtoken=nope; token="));
        assert_eq!(extract_session_token(&headers), None);
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn extract_token_across_multiple_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("token=t1"));
        assert_eq!(extract_session_token(&headers), Some("t1".to_string()));
    }
}
