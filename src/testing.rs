//! In-memory fakes for the store and model boundaries

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::dataset::types::{ColumnInfo, Record, ResultSet, Row, ScalarValue};
use crate::llm::{CompletionModel, CompletionParams, ModelError};
use crate::store::{Store, StoreError};

const INTROSPECTION_PREFIX: &str = "DESCRIBE ";

#[derive(Default)]
struct StoreLog {
    queries: Vec<String>,
    introspections: Vec<String>,
    batches: Vec<usize>,
}

/// Store that records every call and answers from canned data
#[derive(Default)]
pub struct RecordingStore {
    log: Mutex<StoreLog>,
    columns: Vec<ColumnInfo>,
    result: ResultSet,
    fail_create: Option<String>,
    fail_query: Option<String>,
    fail_insert_at: Option<usize>,
}

impl RecordingStore {
    pub fn with_columns(mut self, columns: &[(&str, &str)]) -> Self {
        self.columns = columns
            .iter()
            .map(|(name, data_type)| ColumnInfo {
                column_name: name.to_string(),
                data_type: data_type.to_string(),
            })
            .collect();
        self
    }

    pub fn with_result(mut self, result: ResultSet) -> Self {
        self.result = result;
        self
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.fail_create = Some(message.to_string());
        self
    }

    pub fn failing_queries(mut self, message: &str) -> Self {
        self.fail_query = Some(message.to_string());
        self
    }

    pub fn failing_insert_at(mut self, batch_index: usize) -> Self {
        self.fail_insert_at = Some(batch_index);
        self
    }

    /// Statements run through `execute` or `query`, excluding introspection.
    pub fn queries(&self) -> Vec<String> {
        self.log.lock().queries.clone()
    }

    pub fn introspections(&self) -> Vec<String> {
        self.log.lock().introspections.clone()
    }

    /// Row count of each successful `bulk_insert`, in call order.
    pub fn inserted_batches(&self) -> Vec<usize> {
        self.log.lock().batches.clone()
    }

    fn answer(&self) -> Result<ResultSet, StoreError> {
        match &self.fail_query {
            Some(message) => Err(StoreError::Sql(message.clone())),
            None => Ok(self.result.clone()),
        }
    }

    fn describe_result(&self) -> ResultSet {
        ResultSet {
            fields: vec!["column_name".to_string(), "data_type".to_string()],
            rows: self
                .columns
                .iter()
                .map(|c| {
                    let mut row = Row::with_capacity(2);
                    row.push("column_name", ScalarValue::Text(c.column_name.clone()));
                    row.push("data_type", ScalarValue::Text(c.data_type.clone()));
                    row
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn execute(&self, sql: &str) -> Result<ResultSet, StoreError> {
        if let Some(table) = sql.strip_prefix(INTROSPECTION_PREFIX) {
            self.log.lock().introspections.push(table.to_string());
            return Ok(self.describe_result());
        }

        self.log.lock().queries.push(sql.to_string());

        if sql.starts_with("CREATE") {
            return match &self.fail_create {
                Some(message) => Err(StoreError::Sql(message.clone())),
                None => Ok(ResultSet::default()),
            };
        }

        self.answer()
    }

    async fn query(&self, sql: &str) -> Result<ResultSet, StoreError> {
        self.log.lock().queries.push(sql.to_string());
        self.answer()
    }

    async fn bulk_insert(
        &self,
        _table: &str,
        _columns: &[String],
        rows: &[Record],
    ) -> Result<usize, StoreError> {
        let mut log = self.log.lock();
        let batch_index = log.batches.len();
        if self.fail_insert_at == Some(batch_index) {
            return Err(StoreError::Sql(format!("batch {} rejected", batch_index)));
        }
        log.batches.push(rows.len());
        Ok(rows.len())
    }

    fn introspection_query(&self, table: &str) -> String {
        format!("{}{}", INTROSPECTION_PREFIX, table)
    }
}

/// Model that replays queued responses and records the prompts it saw
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn replying(responses: &[&str]) -> Self {
        let model = Self::default();
        for response in responses {
            model.push(Ok(response.to_string()));
        }
        model
    }

    pub fn failing(error: ModelError) -> Self {
        let model = Self::default();
        model.push(Err(error));
        model
    }

    pub fn push(&self, response: Result<String, ModelError>) {
        self.responses.lock().push_back(response);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(
        &self,
        prompt: &str,
        _params: CompletionParams,
    ) -> Result<String, ModelError> {
        self.prompts.lock().push(prompt.to_string());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Transport("no scripted response".to_string())))
    }
}
