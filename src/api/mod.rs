use crate::{
    api::handlers::{auth, health},
    db::Database,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, task::JoinHandle};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::{SetRequestHeaderLayer, SetResponseHeaderLayer},
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use crate::GIT_COMMIT_HASH;
pub use openapi::openapi;

/// Build the application router.
///
/// `db` is optional so the service can run on an in-memory credential store;
/// `/health` then reports the database as disabled.
#[must_use]
pub fn router(
    auth_state: Arc<auth::AuthState>,
    db: Option<Database>,
    frontend_origin: Option<HeaderValue>,
) -> Router {
    let mut app = Router::new()
        .route(
            "/auth",
            post(auth::login::authenticate)
                .get(auth::session::session)
                .delete(auth::session::logout),
        )
        .route("/health", get(health::health).options(health::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(SetResponseHeaderLayer::overriding(
                    X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    X_XSS_PROTECTION,
                    HeaderValue::from_static("1; mode=block"),
                ))
                .layer(Extension(auth_state)),
        );

    if let Some(db) = db {
        app = app.layer(Extension(db));
    }

    if let Some(origin) = frontend_origin {
        let cors = CorsLayer::new()
            .allow_headers([CONTENT_TYPE])
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_origin(AllowOrigin::exact(origin))
            .allow_credentials(true);
        app = app.layer(cors);
    }

    app
}

/// Prune expired revocations and idle attempt records on a fixed interval.
pub fn spawn_housekeeping(auth_state: Arc<auth::AuthState>) -> JoinHandle<()> {
    let period = auth_state.config().housekeeping_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            auth_state.housekeeping();
        }
    })
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    auth_state: Arc<auth::AuthState>,
    db: Option<Database>,
    frontend_base_url: Option<&str>,
) -> Result<()> {
    let frontend_origin = frontend_base_url.map(frontend_origin).transpose()?;

    let housekeeping = spawn_housekeeping(auth_state.clone());

    let app = router(auth_state, db, frontend_origin);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    housekeeping.abort();

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().with_context(|| {
        format!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::{
        AuthConfig, AuthState, ManualClock, MemoryCredentialStore, PasswordCost,
    };
    use anyhow::Result;
    use axum::http::{header::ACCESS_CONTROL_ALLOW_ORIGIN, StatusCode};
    use secrecy::SecretString;
    use tower::ServiceExt;

    fn auth_state() -> Result<Arc<AuthState>> {
        let config = AuthConfig::new().with_password_cost(PasswordCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        });
        Ok(Arc::new(AuthState::new(
            config,
            SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(ManualClock::new(1_700_000_000)),
        )?))
    }

    #[test]
    fn frontend_origin_strips_path() -> Result<()> {
        let origin = frontend_origin("https://mission.example.com:8443/app/")?;
        assert_eq!(origin, "https://mission.example.com:8443");
        assert!(frontend_origin("not a url").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn responses_carry_security_headers_and_request_id() -> Result<()> {
        let app = router(auth_state()?, None, None);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers.get(X_CONTENT_TYPE_OPTIONS).map(HeaderValue::as_bytes),
            Some(&b"nosniff"[..])
        );
        assert_eq!(headers.get(X_FRAME_OPTIONS).map(HeaderValue::as_bytes), Some(&b"DENY"[..]));
        assert!(headers.get(X_XSS_PROTECTION).is_some());
        let request_id = headers
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(Ulid::from_string(request_id).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn incoming_request_id_is_kept() -> Result<()> {
        let app = router(auth_state()?, None, None);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "req-123")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(
            response
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok()),
            Some("req-123")
        );
        Ok(())
    }

    #[tokio::test]
    async fn cors_only_when_origin_configured() -> Result<()> {
        let request = || {
            Request::builder()
                .uri("/health")
                .header("origin", "https://mission.example.com")
                .body(Body::empty())
        };

        let without = router(auth_state()?, None, None).oneshot(request()?).await?;
        assert!(without.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

        let origin = frontend_origin("https://mission.example.com")?;
        let with = router(auth_state()?, None, Some(origin))
            .oneshot(request()?)
            .await?;
        assert_eq!(
            with.headers()
                .get(ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|value| value.to_str().ok()),
            Some("https://mission.example.com")
        );
        Ok(())
    }

    #[tokio::test]
    async fn openapi_document_is_served() -> Result<()> {
        let app = router(auth_state()?, None, None);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }
}
