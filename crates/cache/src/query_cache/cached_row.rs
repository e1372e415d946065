use serde::{Deserialize, Serialize};

/// A previously computed result set, as handed back to the executor on a cache hit.
///
/// The cache never looks inside it; it is only encoded and decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Command tag reported by the database (e.g. `SELECT 3`).
    pub command_tag: String,
    /// Column metadata, shared by every row.
    pub columns: Vec<CachedColumn>,
    /// Row values, in column order.
    pub rows: Vec<CachedRow>,
}

/// Column metadata for cached rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedColumn {
    /// Column name.
    pub name: String,
    /// Database type name.
    pub type_name: String,
}

/// A single row of a cached result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedRow {
    pub values: Vec<CachedValue>,
}

/// Cached value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl QueryResult {
    pub fn new(command_tag: impl Into<String>, columns: Vec<CachedColumn>) -> Self {
        Self { command_tag: command_tag.into(), columns, rows: Vec::new() }
    }

    pub fn with_row(mut self, values: Vec<CachedValue>) -> Self {
        self.rows.push(CachedRow { values });
        self
    }

    /// Number of rows in the result.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column_name)
    }

    /// Get a value by row index and column name.
    pub fn get(&self, row: usize, column_name: &str) -> Option<&CachedValue> {
        let idx = self.column_index(column_name)?;
        self.rows.get(row)?.values.get(idx)
    }
}

impl CachedColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into() }
    }
}

impl CachedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CachedValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CachedValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to f64 if possible. Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CachedValue::Real(v) => Some(*v),
            CachedValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CachedValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CachedValue::Blob(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_column_name() {
        let result = QueryResult::new(
            "SELECT 2",
            vec![CachedColumn::new("id", "INTEGER"), CachedColumn::new("name", "TEXT")],
        )
        .with_row(vec![CachedValue::Integer(1), CachedValue::Text("alice".into())])
        .with_row(vec![CachedValue::Integer(2), CachedValue::Null]);

        assert_eq!(result.len(), 2);
        assert_eq!(result.get(0, "name").and_then(CachedValue::as_str), Some("alice"));
        assert_eq!(result.get(1, "id").and_then(CachedValue::as_f64), Some(2.0));
        assert!(result.get(1, "name").unwrap().is_null());
        assert!(result.get(0, "missing").is_none());
        assert!(result.get(5, "id").is_none());
    }
}
