use std::sync::Arc;

use anyhow::anyhow;
use qcache_cache::query_cache::memory::{MemoryBlobStore, MemoryDocumentStore, MemoryEntityStore};
use qcache_cache::query_cache::{
    BlobQueryCacher, BlobStore, DocumentQueryCacher, DocumentStore, EntityQueryCacher,
    EntityStore, QueryCacher,
};

use crate::options::{CacheBackend, CacheOptions};

/// Store clients available to the process. Only the one selected by `--cache.backend` is used.
#[derive(Debug, Default, Clone)]
pub struct Backends {
    pub document: Option<Arc<dyn DocumentStore>>,
    pub entity: Option<Arc<dyn EntityStore>>,
    pub blob: Option<Arc<dyn BlobStore>>,
}

impl Backends {
    /// In-memory clients for every backend.
    pub fn in_memory() -> Self {
        Self {
            document: Some(Arc::new(MemoryDocumentStore::new())),
            entity: Some(Arc::new(MemoryEntityStore::new())),
            blob: Some(Arc::new(MemoryBlobStore::new())),
        }
    }

    /// The cacher for the configured backend, sharing its client.
    pub fn cacher(&self, options: &CacheOptions) -> anyhow::Result<Arc<dyn QueryCacher>> {
        let namespace = options.namespace.clone();
        let missing =
            || anyhow!("No client configured for the {:?} cache backend", options.backend);

        Ok(match options.backend {
            CacheBackend::Document => {
                let client = self.document.clone().ok_or_else(missing)?;
                Arc::new(DocumentQueryCacher::new(client, namespace))
            }
            CacheBackend::Entity => {
                let client = self.entity.clone().ok_or_else(missing)?;
                Arc::new(EntityQueryCacher::new(client, namespace))
            }
            CacheBackend::Blob => {
                let client = self.blob.clone().ok_or_else(missing)?;
                Arc::new(BlobQueryCacher::new(client, namespace))
            }
        })
    }
}
