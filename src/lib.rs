//! Upload tabular data and ask questions about it.
//!
//! CSV uploads become typed tables; questions are turned into SQL by a
//! hosted model, checked by a read-only gate, executed, and explained.

pub mod analysis;
pub mod config;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod server;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use analysis::{AnalysisRequest, AnalysisResponse, Analyst, AnalystSettings};
pub use config::{AppConfig, ConfigError};
pub use error::AnalystError;
