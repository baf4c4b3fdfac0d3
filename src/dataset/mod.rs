//! Dataset ingestion
//!
//! This module turns an uploaded CSV payload into a typed relational table:
//! parsing, identifier sanitization, column type inference and the batched
//! insert plan.

pub mod inference;
pub mod parser;
pub mod sanitize;
pub mod schema;
pub mod types;

pub use inference::{coerce_value, infer_type};
pub use parser::parse_csv;
pub use sanitize::{generate_table_name, is_sanitized, sanitize_identifier, unique_identifiers};
pub use schema::{SchemaBuilder, TablePlan};
pub use types::*;
