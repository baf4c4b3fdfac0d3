//! SQLite-backed store
//!
//! Statements run on pooled connections inside `spawn_blocking`. Each
//! `bulk_insert` call is one transaction, so a failed batch leaves no
//! partial rows of its own; earlier batches stay committed. Analysis
//! queries run with `query_only` switched on and are refused outright when
//! SQLite reports the prepared statement as writing.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection};

use super::pool::{ConnectionPool, PoolConfig};
use super::{quote_identifier, quote_literal, Store, StoreError};
use crate::dataset::types::{Record, ResultSet, Row, ScalarValue};

pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, config: PoolConfig) -> Result<Self, StoreError> {
        Ok(Self {
            pool: ConnectionPool::open(path, config)?,
        })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run `f` against a pooled connection on the blocking thread pool.
    async fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.pool.acquire().await?;
        tokio::task::spawn_blocking(move || f(&mut *conn))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn execute(&self, sql: &str) -> Result<ResultSet, StoreError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| run_statement(conn, &sql))
            .await
    }

    async fn query(&self, sql: &str) -> Result<ResultSet, StoreError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| run_read_only(conn, &sql))
            .await
    }

    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Record],
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = insert_statement(table, columns);
        let rows = rows.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&sql)?;
                for row in &rows {
                    stmt.execute(params_from_iter(row.iter().map(to_sql_value)))?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })
        .await
    }

    fn introspection_query(&self, table: &str) -> String {
        format!(
            "SELECT name AS column_name, type AS data_type FROM pragma_table_info({}) ORDER BY cid",
            quote_literal(table)
        )
    }
}

fn run_statement(conn: &mut Connection, sql: &str) -> Result<ResultSet, StoreError> {
    let stmt = conn.prepare(sql)?;
    read_result(stmt)
}

fn run_read_only(conn: &mut Connection, sql: &str) -> Result<ResultSet, StoreError> {
    conn.execute_batch("PRAGMA query_only = ON")?;

    let result = conn
        .prepare(sql)
        .map_err(StoreError::from)
        .and_then(|stmt| {
            if stmt.readonly() {
                read_result(stmt)
            } else {
                Err(StoreError::WriteRejected)
            }
        });

    // Pooled connections are reused for inserts
    conn.execute_batch("PRAGMA query_only = OFF")?;
    result
}

fn read_result(mut stmt: rusqlite::Statement<'_>) -> Result<ResultSet, StoreError> {
    let fields: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    if fields.is_empty() {
        stmt.execute([])?;
        return Ok(ResultSet::default());
    }

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut out = Row::with_capacity(fields.len());
        for (index, name) in fields.iter().enumerate() {
            out.push(name.clone(), from_sql_value(row.get_ref(index)?));
        }
        rows.push(out);
    }

    Ok(ResultSet { fields, rows })
}

fn insert_statement(table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        column_list,
        placeholders
    )
}

fn to_sql_value(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::Null => Value::Null,
        ScalarValue::Boolean(b) => Value::Integer(i64::from(*b)),
        ScalarValue::Integer(v) => Value::Integer(*v),
        ScalarValue::Float(v) => Value::Real(*v),
        ScalarValue::Timestamp(s) | ScalarValue::Text(s) => Value::Text(s.clone()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> ScalarValue {
    match value {
        ValueRef::Null => ScalarValue::Null,
        ValueRef::Integer(v) => ScalarValue::Integer(v),
        ValueRef::Real(v) => ScalarValue::Float(v),
        ValueRef::Text(bytes) => ScalarValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => ScalarValue::Text(format!("<{} bytes>", bytes.len())),
    }
}
