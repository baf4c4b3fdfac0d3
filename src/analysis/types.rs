//! Request and response types for the analysis pipeline

use serde::{Deserialize, Serialize};

use crate::dataset::types::{Dataset, Row, TypeTag};
use crate::error::AnalystError;

// ============================================================================
// Requests
// ============================================================================

/// One natural-language question about an uploaded table
///
/// Missing fields deserialize as empty so they are reported as malformed
/// input rather than as a body decoding failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisRequest {
    pub table: String,
    pub question: String,
}

/// SQL produced by the model together with the gate's decision
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuery {
    pub sql: String,
    pub accepted: bool,
}

// ============================================================================
// Responses
// ============================================================================

/// Analysis response, also used for failures (`ok: false`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    pub rows: Vec<Row>,
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl AnalysisResponse {
    pub fn failure(err: &AnalystError) -> Self {
        Self {
            ok: false,
            sql: err.rejected_sql().map(str::to_string),
            rows: Vec::new(),
            fields: Vec::new(),
            insight: None,
            error: Some(ErrorBody {
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedColumn {
    pub name: String,
    pub original_name: String,
    #[serde(rename = "type")]
    pub type_tag: TypeTag,
}

/// Response to a successful upload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub ok: bool,
    pub table: String,
    pub columns: Vec<UploadedColumn>,
    pub rows: usize,
    /// Records dropped by the CSV reader; not part of `rows`
    pub skipped_rows: usize,
    pub original_name: Option<String>,
}

impl UploadSummary {
    pub fn new(dataset: &Dataset, skipped_rows: usize, original_name: Option<String>) -> Self {
        Self {
            ok: true,
            table: dataset.table_name.clone(),
            columns: dataset
                .columns
                .iter()
                .map(|c| UploadedColumn {
                    name: c.sanitized_name.clone(),
                    original_name: c.original_name.clone(),
                    type_tag: c.inferred_type,
                })
                .collect(),
            rows: dataset.row_count,
            skipped_rows,
            original_name,
        }
    }
}

/// Response to the one-shot upload-and-ask call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadAnalysis {
    pub upload: UploadSummary,
    #[serde(flatten)]
    pub analysis: AnalysisResponse,
}
