//! Query orchestration
//!
//! [`Analyst`] owns the two request flows:
//!
//! - **upload**: parse CSV → plan schema → create table → insert batches
//! - **analyze**: live schema → SQL prompt → model → gate → execute →
//!   insight (best effort) → response
//!
//! Each call is an independent, strictly sequential pipeline. External calls
//! are made at most once per request and are never retried.

pub mod gate;
pub mod types;


use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::dataset::inference::DEFAULT_SAMPLE_SIZE;
use crate::dataset::parser::parse_csv;
use crate::dataset::sanitize::{generate_table_name, is_sanitized};
use crate::dataset::schema::{SchemaBuilder, DEFAULT_BATCH_SIZE};
use crate::dataset::types::ResultSet;
use crate::error::AnalystError;
use crate::llm::prompt::{
    build_insight_prompt, build_sql_prompt, fallback_insight, strip_code_fences,
};
use crate::llm::{CompletionModel, CompletionParams};
use crate::store::Store;

use gate::{gate, strip_trailing_semicolons, GatePolicy, GateVerdict};
pub use types::{AnalysisRequest, AnalysisResponse, GeneratedQuery, UploadAnalysis, UploadSummary};

/// Rows handed to the insight model
pub const DEFAULT_PREVIEW_LIMIT: usize = 5;

/// Tunables for one [`Analyst`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalystSettings {
    pub preview_limit: usize,
    pub sql_params: CompletionParams,
    pub insight_params: CompletionParams,
    pub gate_policy: GatePolicy,
    pub batch_size: usize,
    pub sample_size: usize,
}

impl Default for AnalystSettings {
    fn default() -> Self {
        Self {
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            sql_params: CompletionParams::SQL,
            insight_params: CompletionParams::INSIGHT,
            gate_policy: GatePolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

// ============================================================================
// Pipeline State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Uploading,
    SchemaReady,
    Prompting,
    Generated,
    Gated,
    Executing,
    Explaining,
    Done,
    Failed,
}

/// Tracks and logs the stage of one request
struct Pipeline {
    request_id: Uuid,
    stage: Stage,
}

impl Pipeline {
    fn start(stage: Stage) -> Self {
        let pipeline = Self {
            request_id: Uuid::new_v4(),
            stage,
        };
        tracing::debug!(request_id = %pipeline.request_id, "Pipeline started in {:?}", stage);
        pipeline
    }

    fn advance(&mut self, next: Stage) {
        tracing::debug!(
            request_id = %self.request_id,
            "Pipeline {:?} -> {:?}",
            self.stage,
            next
        );
        self.stage = next;
    }

    fn fail(&mut self, err: &AnalystError) {
        tracing::warn!(
            request_id = %self.request_id,
            "Pipeline failed in {:?}: {}",
            self.stage,
            err
        );
        self.stage = Stage::Failed;
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Analyst {
    store: Arc<dyn Store>,
    sql_model: Arc<dyn CompletionModel>,
    insight_model: Arc<dyn CompletionModel>,
    schema: SchemaBuilder,
    settings: AnalystSettings,
}

impl Analyst {
    pub fn new(
        store: Arc<dyn Store>,
        sql_model: Arc<dyn CompletionModel>,
        insight_model: Arc<dyn CompletionModel>,
        settings: AnalystSettings,
    ) -> Self {
        Self {
            store,
            sql_model,
            insight_model,
            schema: SchemaBuilder::new(settings.batch_size, settings.sample_size),
            settings,
        }
    }

    /// Persist an uploaded CSV as a new table.
    ///
    /// # Arguments
    /// * `original_name` - Client file name, echoed back in the summary
    /// * `payload` - Raw CSV bytes
    ///
    /// # Returns
    /// * `UploadSummary` naming the new table and its typed columns
    pub async fn upload(
        &self,
        original_name: Option<&str>,
        payload: &[u8],
    ) -> Result<UploadSummary, AnalystError> {
        let mut pipeline = Pipeline::start(Stage::Uploading);

        let result = self.run_upload(original_name, payload).await;
        match &result {
            Ok(summary) => {
                pipeline.advance(Stage::SchemaReady);
                tracing::info!(
                    request_id = %pipeline.request_id,
                    "Uploaded {:?} as {} ({} rows, {} columns)",
                    original_name.unwrap_or("<unnamed>"),
                    summary.table,
                    summary.rows,
                    summary.columns.len()
                );
            }
            Err(err) => pipeline.fail(err),
        }
        result
    }

    async fn run_upload(
        &self,
        original_name: Option<&str>,
        payload: &[u8],
    ) -> Result<UploadSummary, AnalystError> {
        let raw = parse_csv(payload)?;
        let table_name = generate_table_name(Utc::now());
        let plan = self.schema.plan(&table_name, &raw)?;
        let dataset = self.schema.ingest(self.store.as_ref(), &plan).await?;

        Ok(UploadSummary::new(
            &dataset,
            raw.skipped_rows,
            original_name.map(str::to_string),
        ))
    }

    /// Answer a question about an uploaded table.
    ///
    /// The returned response always has `ok: true`; every failure is an
    /// `AnalystError`. Insight failures are not errors and fall back to a
    /// canned explanation.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResponse, AnalystError> {
        validate_request(request)?;

        let mut pipeline = Pipeline::start(Stage::SchemaReady);
        let result = self.run_analysis(&mut pipeline, request).await;
        match &result {
            Ok(_) => pipeline.advance(Stage::Done),
            Err(err) => pipeline.fail(err),
        }
        result
    }

    async fn run_analysis(
        &self,
        pipeline: &mut Pipeline,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResponse, AnalystError> {
        let table = request.table.trim();
        let question = request.question.trim();

        // Schema is read fresh for every question
        let columns = self
            .store
            .describe(table)
            .await
            .map_err(|e| AnalystError::Store {
                message: e.to_string(),
            })?;
        if columns.is_empty() {
            return Err(AnalystError::malformed(format!("Unknown table: {}", table)));
        }

        pipeline.advance(Stage::Prompting);
        let prompt = build_sql_prompt(table, &columns, question);
        let completion = self
            .sql_model
            .complete(&prompt, self.settings.sql_params)
            .await
            .map_err(|e| AnalystError::ModelUnavailable {
                message: e.to_string(),
            })?;

        pipeline.advance(Stage::Generated);
        let sql = strip_code_fences(&completion);
        if sql.trim().is_empty() {
            return Err(AnalystError::ModelUnavailable {
                message: "Model returned no SQL".to_string(),
            });
        }
        tracing::debug!(request_id = %pipeline.request_id, "Generated SQL: {}", sql);

        let verdict = gate(&sql, &self.settings.gate_policy);
        let query = GeneratedQuery {
            accepted: verdict.is_accepted(),
            sql,
        };
        pipeline.advance(Stage::Gated);
        if let GateVerdict::Rejected(reason) = verdict {
            return Err(AnalystError::UnsafeQuery {
                sql: query.sql,
                reason,
            });
        }

        pipeline.advance(Stage::Executing);
        let result = self
            .store
            .query(strip_trailing_semicolons(&query.sql))
            .await
            .map_err(|e| AnalystError::QueryExecution {
                message: e.to_string(),
            })?;

        pipeline.advance(Stage::Explaining);
        let insight = self.explain(question, &query.sql, &result).await;

        Ok(AnalysisResponse {
            ok: true,
            sql: Some(query.sql),
            fields: result.fields,
            rows: result.rows,
            insight: Some(insight),
            error: None,
        })
    }

    /// Upload a CSV and immediately ask one question about it.
    pub async fn analyze_upload(
        &self,
        original_name: Option<&str>,
        payload: &[u8],
        question: &str,
    ) -> Result<UploadAnalysis, AnalystError> {
        // Checked up front so a blank question doesn't leave a table behind
        if question.trim().is_empty() {
            return Err(AnalystError::malformed("Missing question"));
        }

        let upload = self.upload(original_name, payload).await?;
        let analysis = self
            .analyze(&AnalysisRequest {
                table: upload.table.clone(),
                question: question.to_string(),
            })
            .await?;

        Ok(UploadAnalysis { upload, analysis })
    }

    /// Round trip to the store.
    pub async fn check_store(&self) -> Result<(), AnalystError> {
        self.store
            .query("SELECT 1 AS ok")
            .await
            .map(|_| ())
            .map_err(|e| AnalystError::Store {
                message: e.to_string(),
            })
    }

    /// Best-effort explanation of the result preview.
    async fn explain(&self, question: &str, sql: &str, result: &ResultSet) -> String {
        let preview = result.preview(self.settings.preview_limit);
        let prompt = build_insight_prompt(question, preview);

        match self
            .insight_model
            .complete(&prompt, self.settings.insight_params)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback_insight(sql, result.len()),
            Err(e) => {
                tracing::warn!("Insight generation failed, using fallback: {}", e);
                fallback_insight(sql, result.len())
            }
        }
    }
}

fn validate_request(request: &AnalysisRequest) -> Result<(), AnalystError> {
    let table = request.table.trim();
    if table.is_empty() || request.question.trim().is_empty() {
        return Err(AnalystError::malformed("Missing table or question"));
    }
    if !is_sanitized(table) {
        return Err(AnalystError::malformed(format!(
            "Invalid table name: {}",
            table
        )));
    }
    Ok(())
}
