use crate::{
    api::{
        self,
        handlers::auth::{
            AuthConfig, AuthState, CredentialStore, MemoryCredentialStore, PgCredentialStore,
            SystemClock,
        },
    },
    cli::telemetry,
    db::{Database, DatabaseConfig},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub query_cache_capacity: u64,
    pub query_cache_ttl_seconds: u64,
    pub token_secret: SecretString,
    pub token_ttl_seconds: u64,
    pub max_login_attempts: u32,
    pub lockout_seconds: u64,
    pub attempt_retention_seconds: u64,
    pub housekeeping_interval_seconds: u64,
    pub trust_proxy_headers: bool,
    pub frontend_origin: Option<String>,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new()
            .with_token_ttl(Duration::from_secs(self.token_ttl_seconds))
            .with_max_attempts(self.max_login_attempts)
            .with_lockout(Duration::from_secs(self.lockout_seconds))
            .with_attempt_retention(Duration::from_secs(self.attempt_retention_seconds))
            .with_housekeeping_interval(Duration::from_secs(self.housekeeping_interval_seconds))
            .with_trust_proxy_headers(self.trust_proxy_headers)
    }

    fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            max_connections: self.db_max_connections,
            timeout: Duration::from_secs(self.db_timeout_seconds),
            cache_capacity: self.query_cache_capacity,
            cache_ttl: Duration::from_secs(self.query_cache_ttl_seconds),
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = args.auth_config();

    let (db, users): (Option<Database>, Arc<dyn CredentialStore>) = match &args.dsn {
        Some(dsn) => {
            let db = Database::connect(dsn, &args.database_config())
                .await
                .context("Failed to connect to database")?;
            info!("Connected to database");
            (Some(db.clone()), Arc::new(PgCredentialStore::new(db)))
        }
        None => {
            warn!("No --dsn given: accounts are kept in memory and lost on restart");
            (None, Arc::new(MemoryCredentialStore::new()))
        }
    };

    let auth_state = Arc::new(
        AuthState::new(
            auth_config,
            args.token_secret,
            users,
            Arc::new(SystemClock),
        )
        .context("Failed to initialize password hasher")?,
    );

    let served = api::new(args.port, auth_state, db, args.frontend_origin.as_deref()).await;

    telemetry::shutdown_tracer();

    served
}
