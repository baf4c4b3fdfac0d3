//! Core type definitions for uploaded datasets
//!
//! Contains the column/table model produced at upload time and the typed
//! scalar values that cross the store boundary.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

// ============================================================================
// Raw Input Types
// ============================================================================

/// A single row of uploaded data as untyped cell strings
pub type RawRow = Vec<String>;

/// Parsed upload before any typing is applied
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Column headers from the first record
    pub headers: Vec<String>,
    /// Data rows, each normalized to `headers.len()` cells
    pub rows: Vec<RawRow>,
    /// Records dropped because the reader could not decode them
    pub skipped_rows: usize,
}

impl RawTable {
    /// Values of one column in row order.
    pub fn column_values(&self, index: usize) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.get(index).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

// ============================================================================
// Schema Types
// ============================================================================

/// Storage type inferred for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Boolean,
    Integer,
    Float,
    Timestamp,
    Text,
}

impl TypeTag {
    /// Type name used in the table-creation statement.
    pub fn storage_type(self) -> &'static str {
        match self {
            TypeTag::Boolean => "BOOLEAN",
            TypeTag::Integer => "BIGINT",
            TypeTag::Float => "DOUBLE PRECISION",
            TypeTag::Timestamp => "TIMESTAMP",
            TypeTag::Text => "TEXT",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Boolean => "boolean",
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::Timestamp => "timestamp",
            TypeTag::Text => "text",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column definition fixed at upload time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Header text as it appeared in the upload
    pub original_name: String,
    /// Identifier used in the store, unique within the table
    pub sanitized_name: String,
    /// Storage type chosen by sampling the column
    pub inferred_type: TypeTag,
}

/// A persisted upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub table_name: String,
    pub columns: Vec<Column>,
    pub row_count: usize,
}

impl Dataset {
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.sanitized_name.clone())
            .collect()
    }
}

/// One `{column_name, data_type}` pair from schema introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
}

// ============================================================================
// Value Types
// ============================================================================

/// Typed cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    /// Normalized `YYYY-MM-DD HH:MM:SS[.fff]` text
    Timestamp(String),
    Text(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("NULL"),
            ScalarValue::Boolean(b) => write!(f, "{}", b),
            ScalarValue::Integer(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Timestamp(s) | ScalarValue::Text(s) => f.write_str(s),
        }
    }
}

/// Positional values for one insert, ordered like the table's columns
pub type Record = Vec<ScalarValue>;

/// Result row keyed by column name, in select-list order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, ScalarValue)>,
}

impl Row {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: ScalarValue) {
        self.values.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

impl FromIterator<(String, ScalarValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, ScalarValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// Serialized as a JSON object so clients see `{ "col": value }`, keeping order.
impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Rows returned by a query together with the selected column names
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub fields: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first `limit` rows.
    pub fn preview(&self, limit: usize) -> &[Row] {
        &self.rows[..self.rows.len().min(limit)]
    }
}
