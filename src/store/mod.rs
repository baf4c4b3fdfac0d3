//! Relational store boundary
//!
//! The pipeline needs three capabilities from a store: run a statement
//! (DDL or introspection), run a model-generated query that must not write,
//! and insert a batch of rows. Anything implementing [`Store`] can back the
//! pipeline; [`SqliteStore`] is the bundled implementation.

pub mod pool;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::dataset::types::{ColumnInfo, Record, ResultSet, ScalarValue};

pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use sqlite::SqliteStore;

/// Errors reported by a store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Timed out after {0:?} waiting for a database connection")]
    PoolTimeout(Duration),

    #[error("Failed to open database: {0}")]
    Connect(String),

    #[error("{0}")]
    Sql(String),

    #[error("Query would modify the database")]
    WriteRejected,

    #[error("Database worker failed: {0}")]
    Worker(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sql(err.to_string())
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Run one statement and return whatever rows it produces.
    async fn execute(&self, sql: &str) -> Result<ResultSet, StoreError>;

    /// Run one statement on a read-only session. Statements that would
    /// write fail with [`StoreError::WriteRejected`] and change nothing.
    async fn query(&self, sql: &str) -> Result<ResultSet, StoreError>;

    /// Insert `rows` (positional, ordered like `columns`) into `table`.
    ///
    /// Returns the number of rows written.
    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Record],
    ) -> Result<usize, StoreError>;

    /// Statement returning `column_name, data_type` for `table`, ordered by
    /// physical column position.
    fn introspection_query(&self, table: &str) -> String;

    /// Live column list of `table`. Empty when the table does not exist.
    async fn describe(&self, table: &str) -> Result<Vec<ColumnInfo>, StoreError> {
        let result = self.execute(&self.introspection_query(table)).await?;

        Ok(result
            .rows
            .iter()
            .map(|row| ColumnInfo {
                column_name: text_field(row.get("column_name")),
                data_type: text_field(row.get("data_type")),
            })
            .collect())
    }
}

fn text_field(value: Option<&ScalarValue>) -> String {
    match value {
        Some(ScalarValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Quote an identifier for use in generated statements.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quote a string literal for use in generated statements.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
