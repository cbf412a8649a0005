#![allow(clippy::needless_for_each)]

use super::handlers::{
    auth::{login, session, storage, types},
    health,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::authenticate,
        session::session,
        session::logout
    ),
    components(schemas(
        health::Health,
        types::AuthMode,
        types::AuthRequest,
        types::ErrorBody,
        types::ErrorEnvelope,
        types::MessageEnvelope,
        types::SessionEnvelope,
        types::SessionIdentity,
        types::UserEnvelope,
        storage::PublicUser
    )),
    tags(
        (name = "auth", description = "Login, registration and session tokens"),
        (name = "health", description = "Liveness and dependency status")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn documents_every_auth_method() -> Result<()> {
        let doc = serde_json::to_value(openapi())?;
        let auth = doc
            .pointer("/paths/~1auth")
            .context("missing /auth path")?;
        for method in ["get", "post", "delete"] {
            assert!(auth.get(method).is_some(), "missing {method} /auth");
        }
        assert!(doc.pointer("/paths/~1health/get").is_some());
        assert!(doc.pointer("/components/schemas/ErrorEnvelope").is_some());
        Ok(())
    }
}
