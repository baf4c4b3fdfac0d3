//! Hosted language model boundary
//!
//! The pipeline makes two kinds of completion calls: one that turns a
//! question plus schema into SQL, and one that explains a result preview.
//! Both go through [`CompletionModel`] so tests can script the responses.

pub mod client;
pub mod prompt;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{HttpCompletionClient, ModelProvider};

/// Sampling parameters for a single completion call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionParams {
    /// Near-deterministic, short output for SQL generation.
    pub const SQL: CompletionParams = CompletionParams {
        max_tokens: 256,
        temperature: 0.1,
    };

    /// Slightly looser sampling for prose explanations.
    pub const INSIGHT: CompletionParams = CompletionParams {
        max_tokens: 150,
        temperature: 0.3,
    };
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model request timed out")]
    Timeout,

    #[error("Failed to connect: {0}")]
    Transport(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Model returned no text")]
    EmptyCompletion,
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Send `prompt` and return the generated text.
    async fn complete(&self, prompt: &str, params: CompletionParams)
        -> Result<String, ModelError>;
}
