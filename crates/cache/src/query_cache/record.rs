use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::SerializationError;

pub const FIELD_ID: &str = "query_id";
pub const FIELD_DATA: &str = "query_data";
pub const FIELD_EXPIRE_AT: &str = "query_expire_at";

/// A cached query result as stored in a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    /// The query's cache key.
    pub id: String,
    /// The encoded [`QueryResult`](super::QueryResult).
    pub data: Bytes,
    /// Instant at and after which the record is no longer served.
    pub expire_at: DateTime<Utc>,
}

/// A property value in a document or entity.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    String(String),
    Bytes(Bytes),
    Timestamp(DateTime<Utc>),
}

/// Properties of a document or entity, by name.
pub type Fields = BTreeMap<String, FieldValue>;

impl CacheRecord {
    /// Builds a record that expires `ttl` after the current UTC instant.
    pub fn new(id: String, data: Bytes, ttl: Duration) -> Self {
        Self { id, data, expire_at: expire_at(Utc::now(), ttl) }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.expire_at, now)
    }

    pub fn into_fields(self) -> Fields {
        Fields::from([
            (FIELD_ID.to_string(), FieldValue::String(self.id)),
            (FIELD_DATA.to_string(), FieldValue::Bytes(self.data)),
            (FIELD_EXPIRE_AT.to_string(), FieldValue::Timestamp(self.expire_at)),
        ])
    }

    pub fn from_fields(mut fields: Fields) -> Result<Self, SerializationError> {
        let id = match fields.remove(FIELD_ID) {
            Some(FieldValue::String(id)) => id,
            _ => return Err(SerializationError::MalformedRecord { field: FIELD_ID }),
        };
        let data = match fields.remove(FIELD_DATA) {
            Some(FieldValue::Bytes(data)) => data,
            _ => return Err(SerializationError::MalformedRecord { field: FIELD_DATA }),
        };
        let expire_at = match fields.remove(FIELD_EXPIRE_AT) {
            Some(FieldValue::Timestamp(expire_at)) => expire_at,
            _ => return Err(SerializationError::MalformedRecord { field: FIELD_EXPIRE_AT }),
        };

        Ok(Self { id, data, expire_at })
    }
}

/// `now + ttl`, saturating at the latest representable instant.
pub fn expire_at(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A record expiring exactly at `now` is already expired.
pub fn is_expired(expire_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expire_at <= now
}
