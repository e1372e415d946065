use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use qcache_context::Context;
use tracing::trace;

use crate::error::QueryCacheError;

const LOG_TARGET: &str = "qcache::cache";

pub mod blob;
pub mod cached_row;
pub mod codec;
pub mod document;
pub mod entity;
pub mod key;
pub mod memory;
pub mod querier;
pub mod record;

pub use blob::{BlobQueryCacher, BlobStore, BlobStoreError, ObjectAttrs};
pub use cached_row::{CachedColumn, CachedRow, CachedValue, QueryResult};
pub use document::{DocumentQueryCacher, DocumentStore, DocumentStoreError, StatusCode};
pub use entity::{EntityKey, EntityQueryCacher, EntityStore, EntityStoreError};
pub use key::{generate_cache_key, QueryKey};
pub use querier::{CachingQuerier, QueryExecutor, QueryOptions};
pub use record::{CacheRecord, FieldValue, Fields};

/// Result type for cache lookups.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Cache hit - returns the cached data.
    Hit(T),
    /// Cache miss - nothing usable is stored under the key.
    Miss,
}

impl<T> CacheResult<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            CacheResult::Hit(value) => Some(value),
            CacheResult::Miss => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
        match self {
            CacheResult::Hit(value) => CacheResult::Hit(f(value)),
            CacheResult::Miss => CacheResult::Miss,
        }
    }
}

/// Expiry check and decode shared by the stores that keep the expiry next to the payload.
pub(crate) fn decode_record(
    key: &str,
    lookup: CacheResult<CacheRecord>,
) -> Result<CacheResult<QueryResult>, QueryCacheError> {
    let record = match lookup {
        CacheResult::Hit(record) => record,
        CacheResult::Miss => {
            trace!(target: LOG_TARGET, key = %key, "Cache miss");
            return Ok(CacheResult::Miss);
        }
    };

    if record.is_expired_at(Utc::now()) {
        trace!(
            target: LOG_TARGET,
            key = %key,
            expire_at = %record.expire_at,
            "Cache entry expired"
        );
        return Ok(CacheResult::Miss);
    }

    let result = codec::decode(&record.data)?;
    trace!(target: LOG_TARGET, key = %key, rows = result.len(), "Cache hit");
    Ok(CacheResult::Hit(result))
}

/// Tracks whether a cacher was closed and whether closing it releases the client.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    owns_client: bool,
    closed: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn new(owns_client: bool) -> Self {
        Self { owns_client, closed: AtomicBool::new(false) }
    }

    pub(crate) fn ensure_open(&self) -> Result<(), QueryCacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueryCacheError::Closed);
        }
        Ok(())
    }

    /// Marks the cacher closed. Returns true only for the first call on a cacher that owns its
    /// client.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel) && self.owns_client
    }
}

/// Trait defining the query cache interface.
///
/// Implementors must be thread-safe (Send + Sync) and debuggable. A miss, including an expired
/// entry, is `Ok(CacheResult::Miss)`; every `Err` is a real failure the caller decides how to
/// handle.
#[async_trait]
pub trait QueryCacher: Send + Sync + std::fmt::Debug {
    /// Get the cached result for a query.
    async fn get(
        &self,
        ctx: &Context,
        key: &QueryKey,
    ) -> Result<CacheResult<QueryResult>, QueryCacheError>;

    /// Store a result, replacing any previous one, for `ttl` from now.
    async fn set(
        &self,
        ctx: &Context,
        key: &QueryKey,
        result: &QueryResult,
        ttl: Duration,
    ) -> Result<(), QueryCacheError>;

    /// Release the backend client if the cacher owns it. Calling it again is a no-op.
    async fn close(&self) -> Result<(), QueryCacheError> {
        Ok(())
    }
}
