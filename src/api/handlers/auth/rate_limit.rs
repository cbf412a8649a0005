//! Failed-login tracking with a time-based lockout.
//!
//! Flow Overview:
//! 1) `begin_attempt` runs before any credential work. Under the client's map
//!    entry it checks the lockout and reserves one in-flight slot. A client
//!    gets at most `max_attempts - failed_count` concurrent credential checks,
//!    and a single one once a lockout has lapsed.
//! 2) The returned `AttemptGuard` settles the slot: `fail` goes through
//!    `record_failure` (bump and stamp), `succeed` through `clear`. Either
//!    then releases the slot; dropping an unsettled guard only releases it.
//! 3) `check_allowed` is the read-only view of the same lockout rule.
//!
//! The lockout lapses on its own once the window has passed; nothing unlocks
//! a client explicitly. Records are kept in a sharded map and every mutation
//! goes through the per-key entry, so a burst from one client cannot read a
//! stale counter, and unrelated clients never contend.

use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::clock::Clock;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptRecord {
    pub failed_count: u32,
    pub last_attempt_at: i64,
    /// Credential checks reserved but not yet settled.
    pub in_flight: u32,
}

impl AttemptRecord {
    const fn is_idle(&self) -> bool {
        self.failed_count == 0 && self.in_flight == 0
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AttemptPolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
    pub retention: Duration,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout: DEFAULT_LOCKOUT,
            retention: DEFAULT_RETENTION,
        }
    }
}

pub struct AttemptTracker {
    records: DashMap<String, AttemptRecord>,
    policy: AttemptPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AttemptTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptTracker")
            .field("records", &self.records.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AttemptTracker {
    #[must_use]
    pub fn new(policy: AttemptPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            policy,
            clock,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    /// Remaining lockout in seconds, if the record is locked out at `now`.
    fn lockout_remaining(&self, record: &AttemptRecord, now: i64) -> Option<u64> {
        if record.failed_count < self.policy.max_attempts {
            return None;
        }
        let lockout = i64::try_from(self.policy.lockout.as_secs()).unwrap_or(i64::MAX);
        let elapsed = now.saturating_sub(record.last_attempt_at);
        (elapsed < lockout).then(|| u64::try_from(lockout - elapsed).unwrap_or(0))
    }

    /// Concurrent credential checks the record still has room for.
    fn slots(&self, record: &AttemptRecord) -> u32 {
        if record.failed_count < self.policy.max_attempts {
            self.policy.max_attempts - record.failed_count
        } else {
            1
        }
    }

    pub fn check_allowed(&self, client_id: &str) -> RateLimitDecision {
        let Some(record) = self.records.get(client_id).map(|entry| *entry) else {
            return RateLimitDecision::Allowed;
        };

        match self.lockout_remaining(&record, self.clock.now()) {
            Some(retry_after) => {
                debug!(client_id, retry_after, "client locked out");
                RateLimitDecision::Limited { retry_after }
            }
            None => RateLimitDecision::Allowed,
        }
    }

    /// Reserve a credential check for `client_id`.
    ///
    /// # Errors
    /// Returns the seconds to wait when the client is locked out, or when its
    /// remaining attempts are all taken by checks still in flight.
    pub fn begin_attempt(&self, client_id: &str) -> Result<AttemptGuard<'_>, u64> {
        let now = self.clock.now();
        let mut entry = self
            .records
            .entry(client_id.to_string())
            .or_insert(AttemptRecord {
                failed_count: 0,
                last_attempt_at: now,
                in_flight: 0,
            });

        if let Some(retry_after) = self.lockout_remaining(&entry, now) {
            debug!(client_id, retry_after, "client locked out");
            return Err(retry_after);
        }
        if entry.in_flight >= self.slots(&entry) {
            debug!(
                client_id,
                in_flight = entry.in_flight,
                "attempts exhausted by checks in flight"
            );
            return Err(1);
        }
        entry.in_flight += 1;
        drop(entry);

        Ok(AttemptGuard {
            tracker: self,
            client_id: client_id.to_string(),
            settled: false,
        })
    }

    /// Count a failed credential attempt and return the new total.
    pub fn record_failure(&self, client_id: &str) -> u32 {
        let now = self.clock.now();
        let mut entry = self
            .records
            .entry(client_id.to_string())
            .or_insert(AttemptRecord {
                failed_count: 0,
                last_attempt_at: now,
                in_flight: 0,
            });
        entry.failed_count = entry.failed_count.saturating_add(1);
        entry.last_attempt_at = now;
        let count = entry.failed_count;
        drop(entry);

        if count >= self.policy.max_attempts {
            warn!(client_id, failed_count = count, "login attempt threshold reached");
        }
        count
    }

    /// Reset the counter. A record with checks in flight is kept for them.
    pub fn clear(&self, client_id: &str) {
        if let Entry::Occupied(mut entry) = self.records.entry(client_id.to_string()) {
            let record = entry.get_mut();
            record.failed_count = 0;
            if record.is_idle() {
                entry.remove();
            }
        }
    }

    fn release(&self, client_id: &str) {
        if let Entry::Occupied(mut entry) = self.records.entry(client_id.to_string()) {
            let record = entry.get_mut();
            record.in_flight = record.in_flight.saturating_sub(1);
            if record.is_idle() {
                entry.remove();
            }
        }
    }

    #[must_use]
    pub fn failed_count(&self, client_id: &str) -> u32 {
        self.records
            .get(client_id)
            .map_or(0, |entry| entry.failed_count)
    }

    /// Drop records idle for longer than the retention period.
    /// Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let now = self.clock.now();
        let retention = i64::try_from(self.policy.retention.as_secs()).unwrap_or(i64::MAX);
        let before = self.records.len();
        self.records.retain(|_, record| {
            record.in_flight > 0 || now.saturating_sub(record.last_attempt_at) < retention
        });
        before.saturating_sub(self.records.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One reserved credential check. Settle it with `fail` or `succeed`;
/// dropping it unsettled gives the slot back without counting anything.
#[derive(Debug)]
#[must_use]
pub struct AttemptGuard<'a> {
    tracker: &'a AttemptTracker,
    client_id: String,
    settled: bool,
}

impl AttemptGuard<'_> {
    /// Count the failure and return the client's new total.
    pub fn fail(mut self) -> u32 {
        // Count before releasing so the slot never looks free early.
        let count = self.tracker.record_failure(&self.client_id);
        self.settled = true;
        self.tracker.release(&self.client_id);
        count
    }

    pub fn succeed(mut self) {
        self.tracker.clear(&self.client_id);
        self.settled = true;
        self.tracker.release(&self.client_id);
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.release(&self.client_id);
        }
    }
}
