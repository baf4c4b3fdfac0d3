//! Error taxonomy for the ingestion and analysis pipeline
//!
//! Every variant is scoped to a single request. Boundary crates report their
//! own error types (`StoreError`, `ModelError`) which the pipeline maps into
//! one of these depending on the phase in which the failure happened.

use serde::Serialize;
use thiserror::Error;

/// Typed error enum for upload and analysis requests
#[derive(Debug, Error, Serialize, Clone, PartialEq)]
#[serde(tag = "code", content = "details", rename_all = "camelCase")]
pub enum AnalystError {
    /// Upload has no header, no columns or no rows, or the request is incomplete
    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    /// The store rejected the table DDL
    #[error("Failed to create table: {message}")]
    SchemaCreation { message: String },

    /// A batch failed; rows from earlier batches remain committed
    #[error(
        "Failed to insert data at batch {batch_index} ({committed_rows} rows already committed): {message}"
    )]
    #[serde(rename_all = "camelCase")]
    Insert {
        batch_index: usize,
        committed_rows: usize,
        message: String,
    },

    /// The completion call failed, timed out or returned nothing usable
    #[error("Model unavailable: {message}")]
    ModelUnavailable { message: String },

    /// The generated SQL did not pass the read-only gate
    #[error("Generated SQL rejected (non-SELECT): {reason}")]
    UnsafeQuery { sql: String, reason: String },

    /// The store rejected the accepted SQL
    #[error("SQL execution error: {message}")]
    QueryExecution { message: String },

    /// Store failure outside a more specific phase (e.g. schema lookup)
    #[error("Store error: {message}")]
    Store { message: String },
}

impl AnalystError {
    pub fn malformed(message: impl Into<String>) -> Self {
        AnalystError::MalformedInput {
            message: message.into(),
        }
    }

    /// The SQL to show alongside the error, if the failure carries one.
    pub fn rejected_sql(&self) -> Option<&str> {
        match self {
            AnalystError::UnsafeQuery { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Whether the caller, not a collaborator, caused the failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnalystError::MalformedInput { .. } | AnalystError::UnsafeQuery { .. }
        )
    }

    /// Stable machine-readable code, matching the serialized `code` tag.
    pub fn code(&self) -> &'static str {
        match self {
            AnalystError::MalformedInput { .. } => "malformedInput",
            AnalystError::SchemaCreation { .. } => "schemaCreation",
            AnalystError::Insert { .. } => "insert",
            AnalystError::ModelUnavailable { .. } => "modelUnavailable",
            AnalystError::UnsafeQuery { .. } => "unsafeQuery",
            AnalystError::QueryExecution { .. } => "queryExecution",
            AnalystError::Store { .. } => "store",
        }
    }
}
