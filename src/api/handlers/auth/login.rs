//! Login orchestration and the `POST /auth` endpoint.
//!
//! Flow Overview:
//! 1) Reserve an attempt with the tracker. A locked-out client is rejected
//!    before any credential work and the rejection is not counted. The
//!    reservation is atomic per client, so a burst of concurrent requests gets
//!    no more checks than the client has attempts left.
//! 2) Look the account up by normalized email.
//! 3) Verify the password with Argon2. Unknown accounts are verified against
//!    a dummy hash and fail the same way as a wrong password.
//! 4) On success clear the client's record and issue a token; on failure
//!    record the attempt.
//!
//! Storage and hashing failures surface as `INFRASTRUCTURE_FAILURE` and are
//! not counted either: they say nothing about the credentials.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    error::AuthError,
    password::verify_blocking,
    register::register,
    session::session_cookie,
    state::AuthState,
    storage::PublicUser,
    token::IssuedToken,
    types::{AuthMode, AuthRequest, ErrorEnvelope, UserEnvelope},
    utils::{client_id, normalize_email},
};

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub user: PublicUser,
    pub token: IssuedToken,
}

/// Run one login attempt for `client_id`.
///
/// # Errors
/// `RateLimited` while the client is locked out, `InvalidRequest` for empty
/// fields, `InvalidCredentials` for unknown accounts or wrong passwords and
/// `Infrastructure` for storage, hashing or signing failures.
#[instrument(skip(auth_state, password), fields(client_id = %client_id))]
pub async fn login(
    auth_state: &AuthState,
    client_id: &str,
    email: &str,
    password: &str,
) -> Result<LoginSuccess, AuthError> {
    let attempt = auth_state
        .attempts()
        .begin_attempt(client_id)
        .map_err(|retry_after| {
            warn!(retry_after, "login rejected: no attempts available");
            AuthError::RateLimited { retry_after }
        })?;

    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::InvalidRequest(
            "Email and password are required".to_string(),
        ));
    }

    let user = auth_state.users().find_by_email(&email).await?;
    let verified = verify_blocking(
        auth_state.passwords(),
        password.to_string(),
        user.as_ref().map(|user| user.password_hash.clone()),
    )
    .await?;

    let user = match user {
        Some(user) if verified => user,
        _ => {
            let failed_count = attempt.fail();
            info!(failed_count, "login failed");
            return Err(AuthError::InvalidCredentials);
        }
    };

    attempt.succeed();
    let token = auth_state.issuer().issue(&user.id)?;
    info!(user_id = %user.id, "login succeeded");

    Ok(LoginSuccess {
        user: user.public(),
        token,
    })
}

#[utoipa::path(
    post,
    path = "/auth",
    request_body = AuthRequest,
    responses(
        (status = 200, description = "Logged in; `token` cookie set", body = UserEnvelope),
        (status = 201, description = "Account registered", body = UserEnvelope),
        (status = 400, description = "Invalid request body or mode", body = ErrorEnvelope),
        (status = 401, description = "Invalid email or password", body = ErrorEnvelope),
        (status = 409, description = "Email already registered", body = ErrorEnvelope),
        (status = 429, description = "Too many failed attempts", body = ErrorEnvelope),
        (status = 503, description = "Infrastructure failure", body = ErrorEnvelope),
    ),
    tag = "auth"
)]
pub async fn authenticate(
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<AuthRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::InvalidRequest("Missing or invalid request body".to_string())
            .into_response();
    };

    match request.mode {
        AuthMode::Login => {
            let client = client_id(
                &headers,
                connect_info.map(|ConnectInfo(addr)| addr),
                auth_state.config().trust_proxy_headers(),
            );
            match login(&auth_state, &client, &request.email, &request.password).await {
                Ok(success) => login_response(&auth_state, success),
                Err(err) => err.into_response(),
            }
        }
        AuthMode::Register => {
            match register(
                &auth_state,
                request.name.as_deref(),
                &request.email,
                &request.password,
            )
            .await
            {
                Ok(user) => (
                    StatusCode::CREATED,
                    Json(UserEnvelope {
                        success: true,
                        data: user,
                    }),
                )
                    .into_response(),
                Err(err) => err.into_response(),
            }
        }
    }
}

fn login_response(auth_state: &AuthState, success: LoginSuccess) -> Response {
    let cookie = match session_cookie(
        &success.token.token,
        auth_state.config().token_ttl_seconds(),
    ) {
        Ok(cookie) => cookie,
        Err(err) => {
            return AuthError::Infrastructure(format!("failed to build session cookie: {err}"))
                .into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    (
        StatusCode::OK,
        response_headers,
        Json(UserEnvelope {
            success: true,
            data: success.user,
        }),
    )
        .into_response()
}
