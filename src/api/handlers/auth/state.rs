//! Auth state and configuration.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{
    clock::Clock,
    password::{PasswordCost, PasswordError, PasswordHasher},
    rate_limit::{AttemptPolicy, AttemptTracker},
    revocation::RevocationList,
    storage::CredentialStore,
    token::{SigningKey, TokenIssuer, TokenValidator, DEFAULT_TOKEN_TTL},
};

const DEFAULT_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_ttl: Duration,
    attempt_policy: AttemptPolicy,
    trust_proxy_headers: bool,
    housekeeping_interval: Duration,
    password_cost: PasswordCost,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_ttl: DEFAULT_TOKEN_TTL,
            attempt_policy: AttemptPolicy::default(),
            trust_proxy_headers: false,
            housekeeping_interval: DEFAULT_HOUSEKEEPING_INTERVAL,
            password_cost: PasswordCost::default(),
        }
    }

    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.attempt_policy.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: Duration) -> Self {
        self.attempt_policy.lockout = lockout;
        self
    }

    #[must_use]
    pub fn with_attempt_retention(mut self, retention: Duration) -> Self {
        self.attempt_policy.retention = retention;
        self
    }

    #[must_use]
    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    #[must_use]
    pub fn with_housekeeping_interval(mut self, interval: Duration) -> Self {
        self.housekeeping_interval = interval;
        self
    }

    #[must_use]
    pub fn with_password_cost(mut self, cost: PasswordCost) -> Self {
        self.password_cost = cost;
        self
    }

    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    #[must_use]
    pub fn attempt_policy(&self) -> AttemptPolicy {
        self.attempt_policy
    }

    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }

    #[must_use]
    pub fn housekeeping_interval(&self) -> Duration {
        self.housekeeping_interval
    }

    pub(super) fn token_ttl_seconds(&self) -> u64 {
        self.token_ttl.as_secs()
    }
}

/// Shared state behind every `/auth` request.
pub struct AuthState {
    config: AuthConfig,
    attempts: AttemptTracker,
    revocations: Arc<RevocationList>,
    issuer: TokenIssuer,
    validator: TokenValidator,
    passwords: Arc<PasswordHasher>,
    users: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("attempts", &self.attempts)
            .field("revocations", &self.revocations.len())
            .finish_non_exhaustive()
    }
}

impl AuthState {
    /// # Errors
    /// Returns an error if the password hasher rejects the configured cost.
    pub fn new(
        config: AuthConfig,
        token_secret: SecretString,
        users: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PasswordError> {
        let key = SigningKey::new(token_secret);
        let revocations = Arc::new(RevocationList::new());
        let passwords = Arc::new(PasswordHasher::new(config.password_cost)?);

        Ok(Self {
            attempts: AttemptTracker::new(config.attempt_policy, clock.clone()),
            issuer: TokenIssuer::new(key.clone(), config.token_ttl, clock.clone()),
            validator: TokenValidator::new(key, clock.clone(), revocations.clone()),
            revocations,
            passwords,
            users,
            clock,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn attempts(&self) -> &AttemptTracker {
        &self.attempts
    }

    #[must_use]
    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    pub(super) fn passwords(&self) -> Arc<PasswordHasher> {
        self.passwords.clone()
    }

    pub(super) fn users(&self) -> &dyn CredentialStore {
        self.users.as_ref()
    }

    /// Drop expired revocations and idle attempt records.
    pub fn housekeeping(&self) {
        let revoked = self.revocations.prune_expired(self.clock.now());
        let idle = self.attempts.prune_idle();
        debug!(
            pruned_revocations = revoked,
            pruned_attempts = idle,
            "auth housekeeping"
        );
    }
}
