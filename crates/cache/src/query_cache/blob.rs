//! Cache adapter for blob stores addressed by bucket and object name.
//!
//! The expiry is the object's custom time attribute, written together with the payload. Reads
//! check the attribute first and only open the (more expensive) object stream for unexpired
//! objects.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use qcache_context::Context;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use super::record::{expire_at, is_expired};
use super::{codec, CacheResult, Lifecycle, QueryCacher, QueryKey, QueryResult};
use crate::error::QueryCacheError;

const LOG_TARGET: &str = "qcache::cache::blob";

/// Streamed object contents.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Object metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectAttrs {
    pub bucket: String,
    pub name: String,
    pub size: u64,
    /// User-settable timestamp, used as the cache entry's expiry.
    pub custom_time: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("Blob store: object doesn't exist")]
    ObjectNotExist,
    #[error("Blob store: bucket doesn't exist")]
    BucketNotExist,
    #[error("Blob store: {0}")]
    Api(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Client of a blob store.
#[async_trait]
pub trait BlobStore: Send + Sync + fmt::Debug {
    /// Read an object's metadata. Fails with [`BlobStoreError::ObjectNotExist`] if it does not
    /// exist.
    async fn attrs(&self, bucket: &str, object: &str) -> Result<ObjectAttrs, BlobStoreError>;

    /// Open an object for reading. Fails with [`BlobStoreError::ObjectNotExist`] if it does not
    /// exist.
    async fn reader(&self, bucket: &str, object: &str) -> Result<BlobReader, BlobStoreError>;

    /// Write an object and its attributes in a single operation, replacing any previous object.
    async fn write(
        &self,
        bucket: &str,
        object: &str,
        attrs: ObjectAttrs,
        data: Bytes,
    ) -> Result<(), BlobStoreError>;

    async fn close(&self) -> Result<(), BlobStoreError>;
}

/// [`QueryCacher`] storing one object per query in a bucket.
#[derive(Debug)]
pub struct BlobQueryCacher<C: ?Sized> {
    client: Arc<C>,
    bucket: String,
    lifecycle: Lifecycle,
}

impl<C: BlobStore + ?Sized> BlobQueryCacher<C> {
    /// Create a cacher over a shared client. Closing the cacher leaves the client open.
    pub fn new(client: Arc<C>, bucket: impl Into<String>) -> Self {
        Self { client, bucket: bucket.into(), lifecycle: Lifecycle::new(false) }
    }

    /// Make [`QueryCacher::close`] close the client too.
    pub fn owning_client(mut self) -> Self {
        self.lifecycle = Lifecycle::new(true);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn read_object(
        &self,
        ctx: &Context,
        object: &str,
        size_hint: u64,
    ) -> Result<CacheResult<Vec<u8>>, QueryCacheError> {
        let mut reader = match ctx.run(self.client.reader(&self.bucket, object)).await? {
            Ok(reader) => reader,
            // Deleted between the attribute read and the stream open.
            Err(BlobStoreError::ObjectNotExist) => return Ok(CacheResult::Miss),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::with_capacity(size_hint.min(16 * 1024 * 1024) as usize);
        ctx.run(reader.read_to_end(&mut data)).await?.map_err(BlobStoreError::from)?;
        Ok(CacheResult::Hit(data))
    }
}

#[async_trait]
impl<C: BlobStore + ?Sized> QueryCacher for BlobQueryCacher<C> {
    async fn get(
        &self,
        ctx: &Context,
        key: &QueryKey,
    ) -> Result<CacheResult<QueryResult>, QueryCacheError> {
        self.lifecycle.ensure_open()?;

        let object = key.cache_key();
        let attrs = match ctx.run(self.client.attrs(&self.bucket, &object)).await? {
            Ok(attrs) => attrs,
            Err(BlobStoreError::ObjectNotExist) => {
                trace!(target: LOG_TARGET, object = %object, "Cache miss");
                return Ok(CacheResult::Miss);
            }
            Err(e) => return Err(e.into()),
        };

        // An object without a custom time was not written by this cacher and is never served.
        match attrs.custom_time {
            Some(custom_time) if !is_expired(custom_time, Utc::now()) => {}
            custom_time => {
                trace!(target: LOG_TARGET, object = %object, ?custom_time, "Cache entry expired");
                return Ok(CacheResult::Miss);
            }
        }

        match self.read_object(ctx, &object, attrs.size).await? {
            CacheResult::Hit(data) => {
                let result = codec::decode(&data)?;
                trace!(target: LOG_TARGET, object = %object, rows = result.len(), "Cache hit");
                Ok(CacheResult::Hit(result))
            }
            CacheResult::Miss => Ok(CacheResult::Miss),
        }
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
        let object = key.cache_key();
        let attrs = ObjectAttrs {
            bucket: self.bucket.clone(),
            name: object.clone(),
            size: data.len() as u64,
            custom_time: Some(expire_at(Utc::now(), ttl)),
            updated: None,
        };
        debug!(
            target: LOG_TARGET,
            bucket = %self.bucket,
            object = %object,
            custom_time = ?attrs.custom_time,
            "Caching query result"
        );

        ctx.run(self.client.write(&self.bucket, &object, attrs, data)).await??;
        Ok(())
    }

    async fn close(&self) -> Result<(), QueryCacheError> {
        if self.lifecycle.close() {
            debug!(target: LOG_TARGET, bucket = %self.bucket, "Closing blob store client");
            self.client.close().await?;
        }
        Ok(())
    }
}
