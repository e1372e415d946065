use qcache_context::Interrupted;
use thiserror::Error;

use crate::query_cache::blob::BlobStoreError;
use crate::query_cache::document::DocumentStoreError;
use crate::query_cache::entity::EntityStoreError;

#[derive(Error, Debug)]
pub enum QueryCacheError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error(transparent)]
    Document(#[from] DocumentStoreError),
    #[error(transparent)]
    Entity(#[from] EntityStoreError),
    #[error(transparent)]
    Blob(#[from] BlobStoreError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("Query cacher is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Failed to encode query result: {0}")]
    Encode(#[source] bincode::Error),
    #[error("Failed to decode query result: {0}")]
    Decode(#[source] bincode::Error),
    #[error("Payload is not an encoded query result")]
    InvalidHeader,
    #[error("Unsupported payload version: {0}")]
    UnsupportedVersion(u8),
    #[error("Malformed cache record: field `{field}` is missing or has the wrong type")]
    MalformedRecord { field: &'static str },
}
