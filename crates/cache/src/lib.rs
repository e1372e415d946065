//! Pluggable query result caching.
//!
//! A [`QueryCacher`](query_cache::QueryCacher) stores encoded
//! [`QueryResult`](query_cache::QueryResult)s in an external store under a key derived from the
//! query fingerprint. Three stores are supported, each behind its own client trait:
//!
//! - [`DocumentQueryCacher`](query_cache::DocumentQueryCacher) for collection/document stores,
//! - [`EntityQueryCacher`](query_cache::EntityQueryCacher) for kind/name entity stores,
//! - [`BlobQueryCacher`](query_cache::BlobQueryCacher) for bucket/object blob stores.
//!
//! Expired entries read as a miss and are left in place; the stores are expected to reclaim them
//! on their own, or not at all.

pub mod error;
pub mod query_cache;

#[cfg(test)]
mod test;

pub use error::{QueryCacheError, SerializationError};
