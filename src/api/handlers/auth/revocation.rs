//! Process-lifetime set of revoked token ids.
//!
//! Not persisted: a restart forgets revocations, which is bounded by the
//! token TTL. Each entry remembers when its token expires so it can be
//! pruned once the token would be rejected as expired anyway.

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct RevocationList {
    revoked: DashMap<String, i64>,
}

impl RevocationList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `token_id`. Revoking twice is a no-op.
    pub fn revoke(&self, token_id: &str, expires_at: i64) {
        self.revoked
            .entry(token_id.to_string())
            .or_insert(expires_at);
    }

    #[must_use]
    pub fn is_revoked(&self, token_id: &str) -> bool {
        self.revoked.contains_key(token_id)
    }

    /// Remove entries whose token has expired by `now`.
    pub fn prune_expired(&self, now: i64) -> usize {
        let before = self.revoked.len();
        self.revoked.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.revoked.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}
