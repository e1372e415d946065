use std::fmt;

use sha2::{Digest, Sha256};

const KEY_PREFIX: &str = "query";
const MAX_TABLE_LEN: usize = 64;

/// Fingerprint of a cacheable query: SQL text, bind arguments and an optional cache scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub sql: String,
    pub args: Vec<String>,
    pub scope: Option<String>,
}

impl QueryKey {
    pub fn new(sql: impl Into<String>, args: Vec<String>) -> Self {
        Self { sql: sql.into(), args, scope: None }
    }

    /// Scope the key, e.g. per tenant, so identical queries in different scopes do not share
    /// cached results.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// The identifier this query is stored under in every backend.
    pub fn cache_key(&self) -> String {
        generate_cache_key(self)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Generate a cache key from a query fingerprint.
///
/// The key format is: `query:{table}:{hash}` where hash is the hex SHA-256 of the SQL, the bind
/// parameters and the scope. Every component is length prefixed so that moving bytes between
/// arguments changes the hash. Keys only contain `[A-Za-z0-9_:]`.
pub fn generate_cache_key(key: &QueryKey) -> String {
    let mut hasher = Sha256::new();
    update_field(&mut hasher, key.sql.as_bytes());
    hasher.update((key.args.len() as u64).to_le_bytes());
    for arg in &key.args {
        update_field(&mut hasher, arg.as_bytes());
    }
    match &key.scope {
        Some(scope) => {
            hasher.update([1u8]);
            update_field(&mut hasher, scope.as_bytes());
        }
        None => hasher.update([0u8]),
    }
    let hash = hasher.finalize();

    let table = extract_table_name(&key.sql).map(sanitize).filter(|t| !t.is_empty());
    format!("{}:{}:{:x}", KEY_PREFIX, table.as_deref().unwrap_or("unknown"), hash)
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Keep the table name usable as part of a document id, entity name and object name.
fn sanitize(table: &str) -> String {
    table
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(MAX_TABLE_LEN)
        .collect()
}

/// Extract the primary table name from a SQL query.
///
/// Handles bracketed `[table_name]`, quoted `"table_name"` and plain table names.
fn extract_table_name(sql: &str) -> Option<&str> {
    let sql_upper = sql.to_ascii_uppercase();
    let from_idx = sql_upper.find("FROM ")?;
    let trimmed = sql[from_idx + 5..].trim_start();

    if let Some(rest) = trimmed.strip_prefix('[') {
        let end = rest.find(']')?;
        Some(&rest[..end])
    } else if let Some(rest) = trimmed.strip_prefix('"') {
        let end = rest.find('"')?;
        Some(&rest[..end])
    } else {
        let end = trimmed
            .find(|c: char| c.is_whitespace() || c == ',' || c == ')' || c == ';')
            .unwrap_or(trimmed.len());
        if end == 0 {
            None
        } else {
            Some(&trimmed[..end])
        }
    }
}
