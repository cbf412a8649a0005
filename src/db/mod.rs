//! Parameterized query interface over a Postgres pool.
//!
//! Every statement goes through [`statement::prepare`] (placeholder rewriting
//! and guard rails), runs under a bounded timeout and is logged as a
//! `db.metrics` event. Read-only statements can opt into the bounded
//! [`QueryCache`].

pub mod cache;
pub mod statement;

pub use cache::QueryCache;
pub use statement::{Param, Params, Prepared};

use serde_json::{Map, Value};
use sqlx::{
    postgres::{PgArguments, PgPoolOptions, PgRow},
    query::Query,
    Column, Connection, PgPool, Postgres, Row, TypeInfo,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, instrument, Instrument};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const METRICS_SQL_LIMIT: usize = 255;

/// A row as column name -> JSON value.
pub type Record = Map<String, Value>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("dangerous query detected")]
    Rejected,
    #[error("query exceeded {0:?}")]
    Timeout(Duration),
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("failed to decode column {0}")]
    Decode(String),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QueryOptions {
    pub use_cache: bool,
}

impl QueryOptions {
    #[must_use]
    pub const fn cached() -> Self {
        Self { use_cache: true }
    }
}

#[derive(Clone, Debug)]
pub struct QueryOutcome {
    pub rows: Vec<Record>,
    pub affected_rows: u64,
    pub execution_time: Duration,
    pub cached: bool,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub timeout: Duration,
    pub cache_capacity: u64,
    pub cache_ttl: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            timeout: DEFAULT_TIMEOUT,
            cache_capacity: cache::DEFAULT_CAPACITY,
            cache_ttl: cache::DEFAULT_TTL,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
    timeout: Duration,
    cache: QueryCache,
}

impl Database {
    #[must_use]
    pub fn new(pool: PgPool, timeout: Duration, cache: QueryCache) -> Self {
        Self {
            pool,
            timeout,
            cache,
        }
    }

    /// Connect a pool using the given configuration.
    ///
    /// # Errors
    /// Returns an error if the pool cannot be established within the connect timeout.
    pub async fn connect(dsn: &str, config: &DatabaseConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(config.max_connections)
            .acquire_timeout(CONNECT_TIMEOUT)
            .max_lifetime(Duration::from_secs(60 * 30))
            .test_before_acquire(true)
            .connect(dsn)
            .await?;

        Ok(Self::new(
            pool,
            config.timeout,
            QueryCache::new(config.cache_capacity, config.cache_ttl),
        ))
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Execute a statement and return its rows as key/value records.
    ///
    /// # Errors
    /// Returns `DbError` for invalid or rejected statements, timeouts and driver failures.
    #[instrument(skip(self, params), fields(db.system = "postgresql"))]
    pub async fn query(
        &self,
        sql: &str,
        params: Params,
        options: QueryOptions,
    ) -> Result<QueryOutcome, DbError> {
        let prepared = statement::prepare(sql, params)?;

        let cache_key = (prepared.is_select && options.use_cache)
            .then(|| QueryCache::key(&prepared.sql, &prepared.params));

        if let Some(key) = &cache_key {
            if let Some(rows) = self.cache.get(key).await {
                debug!("query cache hit");
                let rows = rows.as_ref().clone();
                return Ok(QueryOutcome {
                    affected_rows: rows.len() as u64,
                    rows,
                    execution_time: Duration::ZERO,
                    cached: true,
                });
            }
        }

        let start = Instant::now();
        let (rows, affected_rows) = self.run(&prepared).await?;
        let execution_time = start.elapsed();

        log_query_metrics(&prepared.sql, execution_time, affected_rows);

        if let Some(key) = cache_key {
            self.cache.insert(key, rows.clone()).await;
        }

        Ok(QueryOutcome {
            rows,
            affected_rows,
            execution_time,
            cached: false,
        })
    }

    async fn run(&self, prepared: &Prepared) -> Result<(Vec<Record>, u64), DbError> {
        let operation = prepared
            .sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = %operation
        );

        let mut query = sqlx::query(&prepared.sql);
        for param in &prepared.params {
            query = bind(query, param);
        }

        if prepared.returns_rows {
            let rows = tokio::time::timeout(self.timeout, query.fetch_all(&self.pool))
                .instrument(span)
                .await
                .map_err(|_| DbError::Timeout(self.timeout))?
                .map_err(map_sqlx_error)?;
            let records = rows
                .iter()
                .map(row_to_record)
                .collect::<Result<Vec<_>, _>>()?;
            let affected = records.len() as u64;
            Ok((records, affected))
        } else {
            let result = tokio::time::timeout(self.timeout, query.execute(&self.pool))
                .instrument(span)
                .await
                .map_err(|_| DbError::Timeout(self.timeout))?
                .map_err(map_sqlx_error)?;
            Ok((Vec::new(), result.rows_affected()))
        }
    }

    /// Acquire a connection and ping it within the query timeout.
    ///
    /// # Errors
    /// Returns `DbError::Timeout` or the driver error.
    pub async fn ping(&self) -> Result<(), DbError> {
        let span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        tokio::time::timeout(self.timeout, async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await
        })
        .instrument(span)
        .await
        .map_err(|_| DbError::Timeout(self.timeout))?
        .map_err(DbError::from)
    }
}

fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q Param,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        Param::Text(value) => query.bind(value.as_str()),
        Param::Int(value) => query.bind(*value),
        Param::Float(value) => query.bind(*value),
        Param::Bool(value) => query.bind(*value),
        Param::Uuid(value) => query.bind(*value),
        Param::Null => query.bind(None::<String>),
    }
}

fn map_sqlx_error(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().is_some_and(|code| code == "23505") => {
            DbError::UniqueViolation
        }
        _ => DbError::Sqlx(err),
    }
}

fn row_to_record(row: &PgRow) -> Result<Record, DbError> {
    let mut record = Map::with_capacity(row.len());
    for column in row.columns() {
        let index = column.ordinal();
        let name = column.name();
        let decode = |_| DbError::Decode(name.to_string());
        let value = match column.type_info().name() {
            "BOOL" => Value::from(row.try_get::<Option<bool>, _>(index).map_err(decode)?),
            "INT2" => Value::from(
                row.try_get::<Option<i16>, _>(index)
                    .map_err(decode)?
                    .map(i64::from),
            ),
            "INT4" => Value::from(
                row.try_get::<Option<i32>, _>(index)
                    .map_err(decode)?
                    .map(i64::from),
            ),
            "INT8" => Value::from(row.try_get::<Option<i64>, _>(index).map_err(decode)?),
            "FLOAT4" => Value::from(
                row.try_get::<Option<f32>, _>(index)
                    .map_err(decode)?
                    .map(f64::from),
            ),
            "FLOAT8" => Value::from(row.try_get::<Option<f64>, _>(index).map_err(decode)?),
            "UUID" => Value::from(
                row.try_get::<Option<uuid::Uuid>, _>(index)
                    .map_err(decode)?
                    .map(|id| id.to_string()),
            ),
            "TIMESTAMPTZ" => Value::from(
                row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
                    .map_err(decode)?
                    .map(|ts| ts.to_rfc3339()),
            ),
            _ => Value::from(row.try_get::<Option<String>, _>(index).map_err(decode)?),
        };
        record.insert(name.to_string(), value);
    }
    Ok(record)
}

fn log_query_metrics(sql: &str, duration: Duration, affected_rows: u64) {
    let query: String = sql.chars().take(METRICS_SQL_LIMIT).collect();
    info!(
        target: "db.metrics",
        query = %query,
        duration_ms = duration.as_secs_f64() * 1000.0,
        affected_rows,
        "query executed"
    );
}

/// Read a text column from a record.
///
/// # Errors
/// Returns `DbError::Decode` when the column is missing or not a string.
pub fn text_field(record: &Record, column: &str) -> Result<String, DbError> {
    record
        .get(column)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DbError::Decode(column.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn lazy_database(timeout: Duration) -> Result<Database> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://postgres@127.0.0.1:1/mission")?;
        Ok(Database::new(pool, timeout, QueryCache::default()))
    }

    #[tokio::test]
    async fn rejected_statement_never_reaches_the_pool() -> Result<()> {
        let db = lazy_database(DEFAULT_TIMEOUT)?;
        let result = db
            .query("DROP TABLE users", Params::new(), QueryOptions::default())
            .await;
        assert!(matches!(result, Err(DbError::Rejected)));
        Ok(())
    }

    #[tokio::test]
    async fn cached_select_is_served_without_the_pool() -> Result<()> {
        let db = lazy_database(DEFAULT_TIMEOUT)?;
        let sql = "SELECT name FROM users WHERE id = :id";
        let params = Params::new().bind("id", uuid::Uuid::nil());
        let prepared = statement::prepare(sql, params.clone())?;

        let mut row = Record::new();
        row.insert("name".to_string(), Value::from("Ana"));
        db.cache()
            .insert(QueryCache::key(&prepared.sql, &prepared.params), vec![row])
            .await;

        let outcome = db.query(sql, params, QueryOptions::cached()).await?;
        assert!(outcome.cached);
        assert_eq!(text_field(&outcome.rows[0], "name")?, "Ana");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_database_surfaces_an_error() -> Result<()> {
        let db = lazy_database(Duration::from_secs(2))?;
        let result = db
            .query(
                "SELECT name FROM users WHERE id = $1",
                Params::new().push(uuid::Uuid::nil()),
                QueryOptions::default(),
            )
            .await;
        assert!(matches!(
            result,
            Err(DbError::Sqlx(_) | DbError::Timeout(_))
        ));
        Ok(())
    }

    #[test]
    fn text_field_requires_string() {
        let mut record = Record::new();
        record.insert("n".to_string(), Value::from(1));
        assert!(matches!(text_field(&record, "n"), Err(DbError::Decode(_))));
        assert!(matches!(text_field(&record, "missing"), Err(DbError::Decode(_))));
    }
}
