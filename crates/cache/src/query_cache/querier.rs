//! Query execution with result caching.
//!
//! [`CachingQuerier`] sits in front of a [`QueryExecutor`]. On a cache hit the executor is not
//! called. On a miss the query runs and its result is cached when it has at most `max_rows` rows.
//! Cache failures never fail the query: they are logged and the executor result is returned.
//!
//! Options can be overridden per query with SQL comments:
//!
//! ```sql
//! -- @cache-ttl 30s
//! -- @cache-max-rows 100
//! SELECT * FROM customer
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qcache_context::Context;
use thiserror::Error;
use tracing::{trace, warn};

use super::{CacheResult, QueryCacher, QueryKey, QueryResult};

const LOG_TARGET: &str = "qcache::cache::querier";

const TTL_ANNOTATION: &str = "@cache-ttl";
const MAX_ROWS_ANNOTATION: &str = "@cache-max-rows";

pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ROWS: usize = 100;

/// Runs queries against the database.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn query(
        &self,
        ctx: &Context,
        sql: &str,
        args: &[String],
    ) -> Result<QueryResult, Self::Error>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("Invalid {annotation} value: {value:?}")]
    InvalidValue { annotation: &'static str, value: String },
}

/// Caching options for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// How long a result stays cached. Zero disables caching.
    pub max_lifetime: Duration,
    /// Results with more rows are not cached.
    pub max_rows: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { max_lifetime: DEFAULT_MAX_LIFETIME, max_rows: DEFAULT_MAX_ROWS }
    }
}

impl QueryOptions {
    /// These options, overridden by any `-- @cache-*` annotations in `sql`.
    pub fn with_annotations(&self, sql: &str) -> Result<Self, AnnotationError> {
        let mut options = self.clone();

        for line in sql.lines() {
            let Some(comment) = line.trim().strip_prefix("--") else {
                continue;
            };
            let comment = comment.trim();

            if let Some(value) = comment.strip_prefix(TTL_ANNOTATION) {
                let value = value.trim();
                options.max_lifetime = parse_duration(value).ok_or_else(|| {
                    AnnotationError::InvalidValue {
                        annotation: TTL_ANNOTATION,
                        value: value.to_string(),
                    }
                })?;
            } else if let Some(value) = comment.strip_prefix(MAX_ROWS_ANNOTATION) {
                let value = value.trim();
                options.max_rows =
                    value.parse().map_err(|_| AnnotationError::InvalidValue {
                        annotation: MAX_ROWS_ANNOTATION,
                        value: value.to_string(),
                    })?;
            }
        }

        Ok(options)
    }
}

/// Parses `250ms`, `30s`, `5m`, `1h` or a bare number of seconds.
fn parse_duration(value: &str) -> Option<Duration> {
    let split = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(amount)),
        "" | "s" => Some(Duration::from_secs(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        "h" => amount.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

/// Wraps a [`QueryExecutor`] with a [`QueryCacher`].
#[derive(Debug)]
pub struct CachingQuerier<E> {
    executor: E,
    cacher: Arc<dyn QueryCacher>,
    options: QueryOptions,
    scope: Option<String>,
}

impl<E: QueryExecutor> CachingQuerier<E> {
    pub fn new(executor: E, cacher: Arc<dyn QueryCacher>, options: QueryOptions) -> Self {
        Self { executor, cacher, options, scope: None }
    }

    /// Scope every cache key, so that queriers with different scopes never share results.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub async fn query(
        &self,
        ctx: &Context,
        sql: &str,
        args: &[String],
    ) -> Result<QueryResult, E::Error> {
        let options = match self.options.with_annotations(sql) {
            Ok(options) => options,
            Err(e) => {
                warn!(target: LOG_TARGET, error = %e, "Ignoring cache for query");
                return self.executor.query(ctx, sql, args).await;
            }
        };
        if options.max_lifetime.is_zero() {
            return self.executor.query(ctx, sql, args).await;
        }

        let mut key = QueryKey::new(sql, args.to_vec());
        key.scope = self.scope.clone();

        match self.cacher.get(ctx, &key).await {
            Ok(CacheResult::Hit(result)) => return Ok(result),
            Ok(CacheResult::Miss) => {}
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    key = %key,
                    error = %e,
                    "Cache lookup failed, executing query"
                );
            }
        }

        let result = self.executor.query(ctx, sql, args).await?;

        if result.len() > options.max_rows {
            trace!(
                target: LOG_TARGET,
                key = %key,
                rows = result.len(),
                max_rows = options.max_rows,
                "Result too large to cache"
            );
            return Ok(result);
        }

        if let Err(e) = self.cacher.set(ctx, &key, &result, options.max_lifetime).await {
            warn!(target: LOG_TARGET, key = %key, error = %e, "Failed to cache query result");
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    use super::*;
    use crate::query_cache::document::{DocumentStoreError, StatusCode};
    use crate::query_cache::memory::MemoryDocumentStore;
    use crate::query_cache::{CachedColumn, CachedValue, DocumentQueryCacher};

    #[derive(Debug, Default)]
    struct CountingExecutor {
        calls: AtomicUsize,
        rows: usize,
    }

    #[derive(Debug, Error)]
    #[error("database unavailable")]
    struct DatabaseError;

    #[async_trait]
    impl QueryExecutor for CountingExecutor {
        type Error = DatabaseError;

        async fn query(
            &self,
            _ctx: &Context,
            _sql: &str,
            args: &[String],
        ) -> Result<QueryResult, Self::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut result = QueryResult::new(
                format!("SELECT {}", self.rows),
                vec![CachedColumn::new("arg", "TEXT")],
            );
            for _ in 0..self.rows {
                result = result.with_row(vec![CachedValue::Text(args.join(","))]);
            }
            Ok(result)
        }
    }

    fn querier(rows: usize, store: Arc<MemoryDocumentStore>) -> CachingQuerier<CountingExecutor> {
        let cacher = Arc::new(DocumentQueryCacher::new(store, "queries"));
        let executor = CountingExecutor { calls: AtomicUsize::new(0), rows };
        CachingQuerier::new(executor, cacher, QueryOptions::default())
    }

    fn calls(querier: &CachingQuerier<CountingExecutor>) -> usize {
        querier.executor().calls.load(Ordering::SeqCst)
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("2d"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_annotations_override_defaults() {
        let sql = "-- @cache-ttl 5m\n  -- @cache-max-rows 3\nSELECT * FROM customer";
        let options = QueryOptions::default().with_annotations(sql).unwrap();
        assert_eq!(options, QueryOptions { max_lifetime: Duration::from_secs(300), max_rows: 3 });

        let plain = QueryOptions::default().with_annotations("SELECT 1").unwrap();
        assert_eq!(plain, QueryOptions::default());
    }

    #[test]
    fn test_invalid_annotation() {
        let err = QueryOptions::default()
            .with_annotations("-- @cache-max-rows many\nSELECT 1")
            .unwrap_err();
        assert_matches!(
            err,
            AnnotationError::InvalidValue { annotation: MAX_ROWS_ANNOTATION, .. }
        );
    }

    #[tokio::test]
    async fn test_hit_skips_executor() {
        let store = Arc::new(MemoryDocumentStore::new());
        let querier = querier(2, store.clone());
        let ctx = Context::background();
        let args = vec!["1".to_string()];

        let first = querier.query(&ctx, "SELECT * FROM customer", &args).await.unwrap();
        let second = querier.query(&ctx, "SELECT * FROM customer", &args).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls(&querier), 1);
        assert_eq!(store.len(), 1);

        querier.query(&ctx, "SELECT * FROM customer", &["2".to_string()]).await.unwrap();
        assert_eq!(calls(&querier), 2);
    }

    #[tokio::test]
    async fn test_large_results_are_not_cached() {
        let store = Arc::new(MemoryDocumentStore::new());
        let querier = querier(5, store.clone());
        let ctx = Context::background();
        let sql = "-- @cache-max-rows 4\nSELECT * FROM customer";

        querier.query(&ctx, sql, &[]).await.unwrap();
        querier.query(&ctx, sql, &[]).await.unwrap();
        assert_eq!(calls(&querier), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_bypasses_cache() {
        let store = Arc::new(MemoryDocumentStore::new());
        let querier = querier(1, store.clone());
        let ctx = Context::background();

        querier.query(&ctx, "-- @cache-ttl 0s\nSELECT 1", &[]).await.unwrap();
        assert_eq!(store.get_count(), 0);
        assert_eq!(store.set_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_failures_are_not_fatal() {
        let store = Arc::new(MemoryDocumentStore::new());
        let querier = querier(1, store.clone());
        let ctx = Context::background();

        store.fail_next(DocumentStoreError::new(StatusCode::Unavailable, "get"));
        store.fail_next(DocumentStoreError::new(StatusCode::PermissionDenied, "set"));

        let result = querier.query(&ctx, "SELECT * FROM customer", &[]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(calls(&querier), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_scope_separates_entries() {
        let store = Arc::new(MemoryDocumentStore::new());
        let ctx = Context::background();
        let tenant_a = querier(1, store.clone()).with_scope("a");
        let tenant_b = querier(1, store.clone()).with_scope("b");

        tenant_a.query(&ctx, "SELECT * FROM customer", &[]).await.unwrap();
        tenant_b.query(&ctx, "SELECT * FROM customer", &[]).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(calls(&tenant_b), 1);
    }
}
