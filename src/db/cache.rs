//! Bounded result cache for read-only statements.
//!
//! Entries are keyed by the rewritten SQL plus its serialized parameters and
//! expire after a fixed TTL. Capacity is enforced by `moka`, which evicts
//! entries once `max_capacity` is exceeded.

use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use super::{Param, Record};

pub const DEFAULT_CAPACITY: u64 = 1000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct QueryCache {
    inner: Cache<String, Arc<Vec<Record>>>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl QueryCache {
    #[must_use]
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cache key for a statement and its ordered parameters.
    #[must_use]
    pub fn key(sql: &str, params: &[Param]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sql.as_bytes());
        hasher.update([0u8]);
        // Param serialization cannot fail; fall back to Debug just in case.
        let encoded =
            serde_json::to_vec(params).unwrap_or_else(|_| format!("{params:?}").into_bytes());
        hasher.update(&encoded);

        hasher
            .finalize()
            .iter()
            .fold(String::with_capacity(64), |mut acc, byte| {
                let _ = write!(acc, "{byte:02x}");
                acc
            })
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Vec<Record>>> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, rows: Vec<Record>) {
        self.inner.insert(key, Arc::new(rows)).await;
    }

}

#[cfg(test)]
impl QueryCache {
    async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    fn record(name: &str) -> Record {
        let mut map = Map::new();
        map.insert("name".to_string(), Value::from(name));
        map
    }

    #[test]
    fn key_depends_on_sql_and_params() {
        let a = QueryCache::key("SELECT 1", &[Param::from("a")]);
        let b = QueryCache::key("SELECT 1", &[Param::from("b")]);
        let c = QueryCache::key("SELECT 2", &[Param::from("a")]);
        assert_eq!(a, QueryCache::key("SELECT 1", &[Param::from("a")]));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn hit_returns_stored_rows() {
        let cache = QueryCache::default();
        cache.insert("k".to_string(), vec![record("Ana")]).await;
        let rows = cache.get("k").await;
        assert_eq!(rows.map(|rows| rows.len()), Some(1));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = QueryCache::new(10, Duration::from_millis(50));
        cache.insert("k".to_string(), vec![record("Ana")]).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn capacity_is_bounded() {
        let cache = QueryCache::new(5, Duration::from_secs(60));
        for i in 0..50 {
            cache.insert(format!("k{i}"), vec![record("x")]).await;
        }
        assert!(cache.entry_count().await <= 5);
    }
}
