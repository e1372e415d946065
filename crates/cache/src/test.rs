//! Behaviour every [`QueryCacher`] shares, checked against each store.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use qcache_context::{Context, Interrupted};

use crate::query_cache::memory::{MemoryBlobStore, MemoryDocumentStore, MemoryEntityStore};
use crate::query_cache::{
    BlobQueryCacher, BlobStoreError, CacheResult, CachedColumn, CachedValue, DocumentQueryCacher,
    DocumentStoreError, EntityQueryCacher, EntityStoreError, QueryCacher, QueryKey, QueryResult,
    StatusCode,
};
use crate::QueryCacheError;

enum Store {
    Document(Arc<MemoryDocumentStore>),
    Entity(Arc<MemoryEntityStore>),
    Blob(Arc<MemoryBlobStore>),
}

impl Store {
    fn all() -> Vec<Store> {
        Self::all_with_latency(None)
    }

    fn all_with_latency(latency: Option<Duration>) -> Vec<Store> {
        let (mut document, mut entity, mut blob) =
            (MemoryDocumentStore::new(), MemoryEntityStore::new(), MemoryBlobStore::new());
        if let Some(latency) = latency {
            document = document.with_latency(latency);
            entity = entity.with_latency(latency);
            blob = blob.with_latency(latency);
        }
        vec![
            Store::Document(Arc::new(document)),
            Store::Entity(Arc::new(entity)),
            Store::Blob(Arc::new(blob)),
        ]
    }

    fn cacher(&self) -> Arc<dyn QueryCacher> {
        match self {
            Store::Document(store) => Arc::new(DocumentQueryCacher::new(store.clone(), "queries")),
            Store::Entity(store) => Arc::new(EntityQueryCacher::new(store.clone(), "Query")),
            Store::Blob(store) => Arc::new(BlobQueryCacher::new(store.clone(), "query-cache")),
        }
    }

    fn fail_next_transport(&self) {
        match self {
            Store::Document(store) => {
                let err = DocumentStoreError::new(StatusCode::Unavailable, "connection reset");
                store.fail_next(err)
            }
            Store::Entity(store) => store.fail_next(EntityStoreError::Rpc("deadline".into())),
            Store::Blob(store) => store.fail_next(BlobStoreError::Api("503".into())),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Store::Document(_) => "document",
            Store::Entity(_) => "entity",
            Store::Blob(_) => "blob",
        }
    }
}

fn result(rows: i64) -> QueryResult {
    let mut result = QueryResult::new(
        format!("SELECT {}", rows),
        vec![CachedColumn::new("id", "INT8"), CachedColumn::new("name", "TEXT")],
    );
    for i in 0..rows {
        result = result.with_row(vec![CachedValue::Integer(i), CachedValue::Text(format!("c{i}"))]);
    }
    result
}

fn key() -> QueryKey {
    QueryKey::new("SELECT id, name FROM customer WHERE id > $1", vec!["0".into()])
}

#[tokio::test]
async fn test_miss_before_set() {
    let ctx = Context::background();
    for store in Store::all() {
        let got = store.cacher().get(&ctx, &key()).await;
        assert_matches!(got, Ok(CacheResult::Miss), "{}", store.name());
    }
}

#[tokio::test]
async fn test_set_then_get() {
    let ctx = Context::background();
    for store in Store::all() {
        let cacher = store.cacher();
        cacher.set(&ctx, &key(), &result(3), Duration::from_secs(60)).await.unwrap();

        let got = cacher.get(&ctx, &key()).await.unwrap();
        assert_eq!(got, CacheResult::Hit(result(3)), "{}", store.name());

        let other = QueryKey::new("SELECT id, name FROM customer WHERE id > $1", vec!["1".into()]);
        assert_matches!(cacher.get(&ctx, &other).await, Ok(CacheResult::Miss), "{}", store.name());
    }
}

#[tokio::test]
async fn test_empty_result_is_a_hit() {
    let ctx = Context::background();
    for store in Store::all() {
        let cacher = store.cacher();
        cacher.set(&ctx, &key(), &result(0), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cacher.get(&ctx, &key()).await.unwrap(), CacheResult::Hit(result(0)));
    }
}

#[tokio::test]
async fn test_expired_entry_is_a_miss() {
    let ctx = Context::background();
    for store in Store::all() {
        let cacher = store.cacher();
        cacher.set(&ctx, &key(), &result(1), Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_matches!(cacher.get(&ctx, &key()).await, Ok(CacheResult::Miss), "{}", store.name());

        match &store {
            // Expired objects are recognised from their attributes alone.
            Store::Blob(blob) => assert_eq!(blob.reader_opens(), 0),
            Store::Document(document) => assert_eq!(document.len(), 1),
            Store::Entity(entity) => assert_eq!(entity.len(), 1),
        }
    }
}

#[tokio::test]
async fn test_zero_ttl_expires_immediately() {
    let ctx = Context::background();
    for store in Store::all() {
        let cacher = store.cacher();
        cacher.set(&ctx, &key(), &result(1), Duration::ZERO).await.unwrap();
        assert_matches!(cacher.get(&ctx, &key()).await, Ok(CacheResult::Miss), "{}", store.name());
    }
}

#[tokio::test]
async fn test_set_overwrites() {
    let ctx = Context::background();
    for store in Store::all() {
        let cacher = store.cacher();
        cacher.set(&ctx, &key(), &result(1), Duration::from_secs(60)).await.unwrap();
        cacher.set(&ctx, &key(), &result(4), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cacher.get(&ctx, &key()).await.unwrap(), CacheResult::Hit(result(4)));

        // A shorter ttl replaces the longer one.
        cacher.set(&ctx, &key(), &result(4), Duration::ZERO).await.unwrap();
        assert_matches!(cacher.get(&ctx, &key()).await, Ok(CacheResult::Miss), "{}", store.name());
    }
}

#[tokio::test]
async fn test_transport_error_is_not_a_miss() {
    let ctx = Context::background();
    for store in Store::all() {
        let cacher = store.cacher();
        store.fail_next_transport();

        let err = cacher.get(&ctx, &key()).await.unwrap_err();
        match &store {
            Store::Document(_) => {
                assert_matches!(err, QueryCacheError::Document(e) if !e.is_not_found())
            }
            Store::Entity(_) => {
                assert_matches!(err, QueryCacheError::Entity(EntityStoreError::Rpc(_)))
            }
            Store::Blob(_) => {
                assert_matches!(err, QueryCacheError::Blob(BlobStoreError::Api(_)))
            }
        }

        store.fail_next_transport();
        let err = cacher.set(&ctx, &key(), &result(1), Duration::from_secs(60)).await;
        assert!(err.is_err(), "{}", store.name());
    }
}

#[tokio::test]
async fn test_deadline_interrupts_slow_store() {
    for store in Store::all_with_latency(Some(Duration::from_millis(500))) {
        let cacher = store.cacher();
        let ctx = Context::background().with_timeout(Duration::from_millis(20));

        let err = cacher.get(&ctx, &key()).await.unwrap_err();
        assert_matches!(err, QueryCacheError::Interrupted(Interrupted::DeadlineExceeded));

        let err = cacher.set(&ctx, &key(), &result(1), Duration::from_secs(60)).await.unwrap_err();
        assert_matches!(err, QueryCacheError::Interrupted(Interrupted::DeadlineExceeded));
    }
}

#[tokio::test]
async fn test_cancelled_context() {
    let ctx = Context::background();
    ctx.cancel();
    for store in Store::all() {
        let err = store.cacher().get(&ctx, &key()).await.unwrap_err();
        assert_matches!(err, QueryCacheError::Interrupted(Interrupted::Cancelled));
    }
}

#[tokio::test]
async fn test_concurrent_gets() {
    let ctx = Context::background();
    for store in Store::all() {
        let cacher = store.cacher();
        cacher.set(&ctx, &key(), &result(8), Duration::from_secs(60)).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cacher = cacher.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move { cacher.get(&ctx, &key()).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), CacheResult::Hit(result(8)));
        }
    }
}

#[tokio::test]
async fn test_stores_share_key_format() {
    let ctx = Context::background();
    let stores = Store::all();
    for store in &stores {
        store.cacher().set(&ctx, &key(), &result(1), Duration::from_secs(60)).await.unwrap();
    }

    let id = key().cache_key();
    assert!(id.starts_with("query:customer:"));
    for store in &stores {
        let found = match store {
            Store::Document(document) => document.document("queries", &id).is_some(),
            Store::Entity(entity) => {
                entity.entity(&crate::query_cache::EntityKey::name_key("Query", &id)).is_some()
            }
            Store::Blob(blob) => blob.object("query-cache", &id).is_some(),
        };
        assert!(found, "{}", store.name());
    }
}
