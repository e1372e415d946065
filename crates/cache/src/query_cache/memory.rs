//! In-memory backend clients.
//!
//! Each client keeps its data in a [`DashMap`] and reports missing data the same way the real
//! store does. Errors can be queued with `fail_next` and call counters are exposed, which makes
//! them suitable for tests and local development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::blob::{BlobReader, BlobStore, BlobStoreError, ObjectAttrs};
use super::document::{DocumentStore, DocumentStoreError, StatusCode};
use super::entity::{EntityKey, EntityStore, EntityStoreError};
use super::record::Fields;

/// Errors queued to be returned by upcoming calls, oldest first.
#[derive(Debug)]
struct Faults<E> {
    queue: Mutex<VecDeque<E>>,
}

impl<E> Default for Faults<E> {
    fn default() -> Self {
        Self { queue: Mutex::new(VecDeque::new()) }
    }
}

impl<E> Faults<E> {
    fn push(&self, err: E) {
        self.queue.lock().push_back(err);
    }

    fn take(&self) -> Option<E> {
        self.queue.lock().pop_front()
    }
}

async fn delay(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

/// In-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<(String, String), Fields>,
    faults: Faults<DocumentStoreError>,
    latency: Option<Duration>,
    gets: AtomicUsize,
    sets: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `get` or `set` fail with `err`.
    pub fn fail_next(&self, err: DocumentStoreError) {
        self.faults.push(err);
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Fields> {
        self.documents.get(&(collection.to_string(), id.to_string())).map(|d| d.clone())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Fields, DocumentStoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        if let Some(err) = self.faults.take() {
            return Err(err);
        }

        self.document(collection, id).ok_or_else(|| {
            DocumentStoreError::new(
                StatusCode::NotFound,
                format!("document {}/{} not found", collection, id),
            )
        })
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), DocumentStoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        if let Some(err) = self.faults.take() {
            return Err(err);
        }

        self.documents.insert((collection.to_string(), id.to_string()), fields);
        Ok(())
    }

    async fn close(&self) -> Result<(), DocumentStoreError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory [`EntityStore`].
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    entities: DashMap<EntityKey, Fields>,
    faults: Faults<EntityStoreError>,
    latency: Option<Duration>,
    gets: AtomicUsize,
    puts: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `get` or `put` fail with `err`.
    pub fn fail_next(&self, err: EntityStoreError) {
        self.faults.push(err);
    }

    pub fn entity(&self, key: &EntityKey) -> Option<Fields> {
        self.entities.get(key).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn get(&self, key: &EntityKey) -> Result<Fields, EntityStoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        if let Some(err) = self.faults.take() {
            return Err(err);
        }

        self.entity(key).ok_or(EntityStoreError::NoSuchEntity)
    }

    async fn put(&self, key: &EntityKey, fields: Fields) -> Result<(), EntityStoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        if let Some(err) = self.faults.take() {
            return Err(err);
        }

        self.entities.insert(key.clone(), fields);
        Ok(())
    }

    async fn close(&self) -> Result<(), EntityStoreError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory [`BlobStore`].
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: DashMap<(String, String), (ObjectAttrs, Bytes)>,
    faults: Faults<BlobStoreError>,
    reader_faults: Faults<BlobStoreError>,
    latency: Option<Duration>,
    attrs_calls: AtomicUsize,
    reader_opens: AtomicUsize,
    writes: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `attrs` or `write` fail with `err`.
    pub fn fail_next(&self, err: BlobStoreError) {
        self.faults.push(err);
    }

    /// Make the next `reader` fail with `err`.
    pub fn fail_reader_next(&self, err: BlobStoreError) {
        self.reader_faults.push(err);
    }

    pub fn object(&self, bucket: &str, object: &str) -> Option<(ObjectAttrs, Bytes)> {
        self.objects.get(&(bucket.to_string(), object.to_string())).map(|o| o.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn attrs_count(&self) -> usize {
        self.attrs_calls.load(Ordering::SeqCst)
    }

    /// Number of `reader` calls, including failed ones.
    pub fn reader_opens(&self) -> usize {
        self.reader_opens.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn attrs(&self, bucket: &str, object: &str) -> Result<ObjectAttrs, BlobStoreError> {
        self.attrs_calls.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        if let Some(err) = self.faults.take() {
            return Err(err);
        }

        self.object(bucket, object).map(|(attrs, _)| attrs).ok_or(BlobStoreError::ObjectNotExist)
    }

    async fn reader(&self, bucket: &str, object: &str) -> Result<BlobReader, BlobStoreError> {
        self.reader_opens.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        if let Some(err) = self.reader_faults.take() {
            return Err(err);
        }

        let (_, data) = self.object(bucket, object).ok_or(BlobStoreError::ObjectNotExist)?;
        Ok(Box::pin(std::io::Cursor::new(data)))
    }

    async fn write(
        &self,
        bucket: &str,
        object: &str,
        mut attrs: ObjectAttrs,
        data: Bytes,
    ) -> Result<(), BlobStoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        delay(self.latency).await;
        if let Some(err) = self.faults.take() {
            return Err(err);
        }

        attrs.bucket = bucket.to_string();
        attrs.name = object.to_string();
        attrs.size = data.len() as u64;
        attrs.updated = Some(Utc::now());
        self.objects.insert((bucket.to_string(), object.to_string()), (attrs, data));
        Ok(())
    }

    async fn close(&self) -> Result<(), BlobStoreError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
