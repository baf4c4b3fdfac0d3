//! Schema building and ingestion
//!
//! Combines sanitized identifiers and inferred types into a table-creation
//! statement plus a batched insert plan, then drives both against a store.

use crate::dataset::inference::{coerce_value, infer_type, DEFAULT_SAMPLE_SIZE};
use crate::dataset::sanitize::unique_identifiers;
use crate::dataset::types::{Column, Dataset, RawTable, Record};
use crate::error::AnalystError;
use crate::store::{quote_identifier, Store};

/// Rows per insert call
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Everything needed to persist one upload
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub dataset: Dataset,
    pub create_sql: String,
    /// Coerced rows in source order, `batch_size` per batch (last may be short)
    pub batches: Vec<Vec<Record>>,
}

impl TablePlan {
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.iter().map(Vec::len).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaBuilder {
    batch_size: usize,
    sample_size: usize,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_SAMPLE_SIZE)
    }
}

impl SchemaBuilder {
    /// Zero sizes are bumped to one.
    pub fn new(batch_size: usize, sample_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            sample_size: sample_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Build the creation statement and insert batches for `raw`.
    ///
    /// # Errors
    /// `MalformedInput` when the upload has no columns or no rows.
    pub fn plan(&self, table_name: &str, raw: &RawTable) -> Result<TablePlan, AnalystError> {
        if raw.headers.is_empty() {
            return Err(AnalystError::malformed("CSV has no columns"));
        }
        if raw.rows.is_empty() {
            return Err(AnalystError::malformed("CSV has no rows"));
        }

        let identifiers = unique_identifiers(&raw.headers);
        let columns: Vec<Column> = raw
            .headers
            .iter()
            .zip(identifiers)
            .enumerate()
            .map(|(index, (original, sanitized))| Column {
                original_name: original.clone(),
                sanitized_name: sanitized,
                inferred_type: infer_type(&raw.column_values(index), self.sample_size),
            })
            .collect();

        for column in &columns {
            tracing::debug!(
                "Column {:?} -> {} {}",
                column.original_name,
                column.sanitized_name,
                column.inferred_type
            );
        }

        let records: Vec<Record> = raw
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| {
                        let raw_value = row.get(index).map(String::as_str).unwrap_or("");
                        coerce_value(raw_value, column.inferred_type)
                    })
                    .collect()
            })
            .collect();

        let batches = records
            .chunks(self.batch_size)
            .map(<[Record]>::to_vec)
            .collect();

        let create_sql = create_table_sql(table_name, &columns);

        Ok(TablePlan {
            dataset: Dataset {
                table_name: table_name.to_string(),
                columns,
                row_count: raw.rows.len(),
            },
            create_sql,
            batches,
        })
    }

    /// Create the table and insert every batch, sequentially.
    ///
    /// Table creation failure aborts with `SchemaCreation`. A failing batch
    /// aborts with `Insert`; batches before it stay committed and nothing is
    /// cleaned up.
    pub async fn ingest(
        &self,
        store: &dyn Store,
        plan: &TablePlan,
    ) -> Result<Dataset, AnalystError> {
        let table = &plan.dataset.table_name;

        store
            .execute(&plan.create_sql)
            .await
            .map_err(|e| AnalystError::SchemaCreation {
                message: e.to_string(),
            })?;
        tracing::info!(
            "Created table {} with {} columns",
            table,
            plan.dataset.columns.len()
        );

        let column_names = plan.dataset.column_names();
        let mut committed_rows = 0;

        for (batch_index, batch) in plan.batches.iter().enumerate() {
            let written = store
                .bulk_insert(table, &column_names, batch)
                .await
                .map_err(|e| {
                    tracing::error!(
                        "Insert into {} failed at batch {} after {} rows: {}",
                        table,
                        batch_index,
                        committed_rows,
                        e
                    );
                    AnalystError::Insert {
                        batch_index,
                        committed_rows,
                        message: e.to_string(),
                    }
                })?;

            committed_rows += written;
            tracing::debug!(
                "Inserted batch {}/{} into {} ({} rows so far)",
                batch_index + 1,
                plan.batches.len(),
                table,
                committed_rows
            );
        }

        Ok(Dataset {
            row_count: committed_rows,
            ..plan.dataset.clone()
        })
    }
}

/// `CREATE TABLE "<table>" ("<col>" <TYPE>, ...)`
pub fn create_table_sql(table_name: &str, columns: &[Column]) -> String {
    let definitions = columns
        .iter()
        .map(|c| {
            format!(
                "{} {}",
                quote_identifier(&c.sanitized_name),
                c.inferred_type.storage_type()
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("CREATE TABLE {} ({})", quote_identifier(table_name), definitions)
}
