//! Cache adapter for entity stores addressed by kind and name.
//!
//! A missing entity is reported through the [`EntityStoreError::NoSuchEntity`] sentinel rather
//! than a status code. Like the document store, expiry lives in a stored field.

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

const LOG_TARGET: &str = "qcache::cache::entity";

/// A named entity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: String,
    pub name: String,
}

impl EntityKey {
    pub fn name_key(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self { kind: kind.into(), name: name.into() }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityStoreError {
    #[error("Entity store: no such entity")]
    NoSuchEntity,
    #[error("Entity store: invalid entity type")]
    InvalidEntityType,
    #[error("Entity store: {0}")]
    Rpc(String),
}

/// Client of an entity store.
#[async_trait]
pub trait EntityStore: Send + Sync + fmt::Debug {
    /// Load an entity. Fails with [`EntityStoreError::NoSuchEntity`] if it does not exist.
    async fn get(&self, key: &EntityKey) -> Result<Fields, EntityStoreError>;

    /// Create or fully replace an entity.
    async fn put(&self, key: &EntityKey, fields: Fields) -> Result<(), EntityStoreError>;

    async fn close(&self) -> Result<(), EntityStoreError>;
}

/// [`QueryCacher`] storing one entity per query under a kind.
#[derive(Debug)]
pub struct EntityQueryCacher<C: ?Sized> {
    client: Arc<C>,
    kind: String,
    lifecycle: Lifecycle,
}

impl<C: EntityStore + ?Sized> EntityQueryCacher<C> {
    /// Create a cacher over a shared client. Closing the cacher leaves the client open.
    pub fn new(client: Arc<C>, kind: impl Into<String>) -> Self {
        Self { client, kind: kind.into(), lifecycle: Lifecycle::new(false) }
    }

    /// Make [`QueryCacher::close`] close the client too.
    pub fn owning_client(mut self) -> Self {
        self.lifecycle = Lifecycle::new(true);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    async fn fetch(
        &self,
        ctx: &Context,
        name: &EntityKey,
    ) -> Result<CacheResult<CacheRecord>, QueryCacheError> {
        match ctx.run(self.client.get(name)).await? {
            Ok(fields) => Ok(CacheResult::Hit(CacheRecord::from_fields(fields)?)),
            Err(e) if e == EntityStoreError::NoSuchEntity => Ok(CacheResult::Miss),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<C: EntityStore + ?Sized> QueryCacher for EntityQueryCacher<C> {
    async fn get(
        &self,
        ctx: &Context,
        key: &QueryKey,
    ) -> Result<CacheResult<QueryResult>, QueryCacheError> {
        self.lifecycle.ensure_open()?;

        let name = EntityKey::name_key(&self.kind, key.cache_key());
        let lookup = self.fetch(ctx, &name).await?;
        decode_record(&name.name, lookup)
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
        let name = EntityKey::name_key(&self.kind, &record.id);
        debug!(
            target: LOG_TARGET,
            key = %name,
            expire_at = %record.expire_at,
            "Caching query result"
        );

        ctx.run(self.client.put(&name, record.into_fields())).await??;
        Ok(())
    }

    async fn close(&self) -> Result<(), QueryCacheError> {
        if self.lifecycle.close() {
            debug!(target: LOG_TARGET, kind = %self.kind, "Closing entity store client");
            self.client.close().await?;
        }
        Ok(())
    }
}
