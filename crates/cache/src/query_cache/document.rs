//! Cache adapter for document stores addressed by collection and document id.
//!
//! The store reports a missing document through a `NotFound` status code. Expiry is a plain
//! `query_expire_at` field that the store does not enforce, so the adapter compares it on read.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qcache_context::Context;
use thiserror::Error;
use tracing::debug;

use super::record::{CacheRecord, Fields};
use super::{codec, decode_record, CacheResult, Lifecycle, QueryCacher, QueryKey, QueryResult};
use crate::error::QueryCacheError;

const LOG_TARGET: &str = "qcache::cache::document";

/// Status codes a document store attaches to its errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    NotFound,
    InvalidArgument,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    Unavailable,
    DeadlineExceeded,
    Internal,
    Unknown,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Document store error ({code}): {message}")]
pub struct DocumentStoreError {
    pub code: StatusCode,
    pub message: String,
}

impl DocumentStoreError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn is_not_found(&self) -> bool {
        self.code == StatusCode::NotFound
    }
}

/// Client of a document store.
#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    /// Read a whole document. Fails with [`StatusCode::NotFound`] if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Fields, DocumentStoreError>;

    /// Create or fully replace a document.
    async fn set(&self, collection: &str, id: &str, fields: Fields)
        -> Result<(), DocumentStoreError>;

    async fn close(&self) -> Result<(), DocumentStoreError>;
}

/// [`QueryCacher`] storing one document per query in a collection.
#[derive(Debug)]
pub struct DocumentQueryCacher<C: ?Sized> {
    client: Arc<C>,
    collection: String,
    lifecycle: Lifecycle,
}

impl<C: DocumentStore + ?Sized> DocumentQueryCacher<C> {
    /// Create a cacher over a shared client. Closing the cacher leaves the client open.
    pub fn new(client: Arc<C>, collection: impl Into<String>) -> Self {
        Self { client, collection: collection.into(), lifecycle: Lifecycle::new(false) }
    }

    /// Make [`QueryCacher::close`] close the client too.
    pub fn owning_client(mut self) -> Self {
        self.lifecycle = Lifecycle::new(true);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn fetch(
        &self,
        ctx: &Context,
        id: &str,
    ) -> Result<CacheResult<CacheRecord>, QueryCacheError> {
        match ctx.run(self.client.get(&self.collection, id)).await? {
            Ok(fields) => Ok(CacheResult::Hit(CacheRecord::from_fields(fields)?)),
            Err(e) if e.is_not_found() => Ok(CacheResult::Miss),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<C: DocumentStore + ?Sized> QueryCacher for DocumentQueryCacher<C> {
    async fn get(
        &self,
        ctx: &Context,
        key: &QueryKey,
    ) -> Result<CacheResult<QueryResult>, QueryCacheError> {
        self.lifecycle.ensure_open()?;

        let id = key.cache_key();
        let lookup = self.fetch(ctx, &id).await?;
        decode_record(&id, lookup)
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &QueryKey,
        result: &QueryResult,
        ttl: Duration,
    ) -> Result<(), QueryCacheError> {
        self.lifecycle.ensure_open()?;

        let data = codec::encode(result)?;
        let record = CacheRecord::new(key.cache_key(), data, ttl);
        debug!(
            target: LOG_TARGET,
            collection = %self.collection,
            id = %record.id,
            expire_at = %record.expire_at,
            "Caching query result"
        );

        let id = record.id.clone();
        ctx.run(self.client.set(&self.collection, &id, record.into_fields())).await??;
        Ok(())
    }

    async fn close(&self) -> Result<(), QueryCacheError> {
        if self.lifecycle.close() {
            debug!(
                target: LOG_TARGET,
                collection = %self.collection,
                "Closing document store client"
            );
            self.client.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bytes::Bytes;

    use super::*;
    use crate::query_cache::memory::MemoryDocumentStore;
    use crate::query_cache::record::{FieldValue, FIELD_DATA};
    use crate::query_cache::{CachedColumn, CachedValue};
    use crate::SerializationError;

    fn result() -> QueryResult {
        QueryResult::new("SELECT 1", vec![CachedColumn::new("first_name", "TEXT")])
            .with_row(vec![CachedValue::Text("Ada".into())])
    }

    fn key() -> QueryKey {
        QueryKey::new("SELECT first_name FROM customer WHERE id = $1", vec!["7".into()])
    }

    #[tokio::test]
    async fn test_stores_record_fields() {
        let store = Arc::new(MemoryDocumentStore::new());
        let cacher = DocumentQueryCacher::new(store.clone(), "queries");
        let ctx = Context::background();

        cacher.set(&ctx, &key(), &result(), Duration::from_secs(30)).await.unwrap();

        let fields = store.document("queries", &key().cache_key()).unwrap();
        let record = CacheRecord::from_fields(fields).unwrap();
        assert_eq!(record.id, key().cache_key());
        assert_eq!(codec::decode(&record.data).unwrap(), result());
        assert!(record.expire_at > chrono::Utc::now());
    }

    #[tokio::test]
    async fn test_unavailable_is_not_a_miss() {
        let store = Arc::new(MemoryDocumentStore::new());
        let cacher = DocumentQueryCacher::new(store.clone(), "queries");

        store.fail_next(DocumentStoreError::new(StatusCode::Unavailable, "connection reset"));
        let err = cacher.get(&Context::background(), &key()).await.unwrap_err();
        assert_matches!(
            err,
            QueryCacheError::Document(DocumentStoreError { code: StatusCode::Unavailable, .. })
        );
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_an_error() {
        let store = Arc::new(MemoryDocumentStore::new());
        let cacher = DocumentQueryCacher::new(store.clone(), "queries");
        let ctx = Context::background();

        cacher.set(&ctx, &key(), &result(), Duration::from_secs(30)).await.unwrap();
        let mut fields = store.document("queries", &key().cache_key()).unwrap();
        fields.insert(FIELD_DATA.to_string(), FieldValue::Bytes(Bytes::from_static(b"garbage")));
        DocumentStore::set(store.as_ref(), "queries", &key().cache_key(), fields).await.unwrap();

        let err = cacher.get(&ctx, &key()).await.unwrap_err();
        assert_matches!(err, QueryCacheError::Serialization(SerializationError::InvalidHeader));
    }

    #[tokio::test]
    async fn test_close_owned_client_once() {
        let store = Arc::new(MemoryDocumentStore::new());
        let cacher = DocumentQueryCacher::new(store.clone(), "queries").owning_client();

        cacher.close().await.unwrap();
        cacher.close().await.unwrap();
        assert_eq!(store.close_count(), 1);

        let err = cacher.get(&Context::background(), &key()).await.unwrap_err();
        assert_matches!(err, QueryCacheError::Closed);
    }

    #[tokio::test]
    async fn test_close_shared_client_keeps_it_open() {
        let store = Arc::new(MemoryDocumentStore::new());
        let cacher = DocumentQueryCacher::new(store.clone(), "queries");

        cacher.close().await.unwrap();
        assert_eq!(store.close_count(), 0);
    }
}
