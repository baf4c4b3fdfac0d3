//! Runtime configuration
//!
//! Settings come from an optional TOML file (path in `ANALYST_CONFIG`),
//! then `ANALYST_*` environment variables override individual fields.
//! Everything except the model API key has a default.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::gate::GatePolicy;
use crate::analysis::{AnalystSettings, DEFAULT_PREVIEW_LIMIT};
use crate::dataset::inference::DEFAULT_SAMPLE_SIZE;
use crate::dataset::schema::DEFAULT_BATCH_SIZE;
use crate::llm::{CompletionParams, ModelProvider};
use crate::store::PoolConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid TOML: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("{0}")]
    Invalid(String),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Largest accepted multipart body
    pub max_upload_bytes: u64,
    /// Browser origins allowed to call the API
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5050)),
            max_upload_bytes: 50 * 1024 * 1024,
            cors_origins: vec![
                "http://localhost:8080".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: usize,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            path: PathBuf::from("data-analyst.sqlite3"),
            max_connections: pool.max_connections,
            connect_timeout_secs: pool.connect_timeout.as_secs(),
            idle_timeout_secs: pool.idle_timeout.as_secs(),
        }
    }
}

impl DatabaseConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub endpoint: String,
    /// Bearer token; required, usually supplied via `ANALYST_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub sql_model: String,
    pub insight_model: String,
    pub timeout_secs: u64,
    pub sql_max_tokens: u32,
    pub sql_temperature: f32,
    pub insight_max_tokens: u32,
    pub insight_temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let provider = ModelProvider::HuggingFace;
        Self {
            provider,
            endpoint: provider.default_endpoint().to_string(),
            api_key: None,
            sql_model: "defog/sqlcoder-7b-2".to_string(),
            insight_model: "google/flan-t5-large".to_string(),
            timeout_secs: 60,
            sql_max_tokens: CompletionParams::SQL.max_tokens,
            sql_temperature: CompletionParams::SQL.temperature,
            insight_max_tokens: CompletionParams::INSIGHT.max_tokens,
            insight_temperature: CompletionParams::INSIGHT.temperature,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preview_limit: usize,
    pub batch_size: usize,
    pub sample_size: usize,
    pub allow_multiple_statements: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            sample_size: DEFAULT_SAMPLE_SIZE,
            allow_multiple_statements: false,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    pub pipeline: PipelineConfig,
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    /// Load from `ANALYST_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("ANALYST_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `ANALYST_*` overrides, reading each key through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ANALYST_BIND") {
            self.server.bind = parse_value("ANALYST_BIND", &value)?;
        }
        if let Some(value) = lookup("ANALYST_DATABASE") {
            self.database.path = PathBuf::from(value);
        }
        if let Some(value) = lookup("ANALYST_POOL_SIZE") {
            self.database.max_connections = parse_value("ANALYST_POOL_SIZE", &value)?;
        }
        if let Some(value) = lookup("ANALYST_MODEL_PROVIDER") {
            let provider =
                ModelProvider::from_str(&value).ok_or_else(|| ConfigError::InvalidValue {
                    key: "ANALYST_MODEL_PROVIDER".to_string(),
                    value: value.clone(),
                })?;
            // Follow the provider's default endpoint unless one is set explicitly
            if self.model.endpoint == self.model.provider.default_endpoint() {
                self.model.endpoint = provider.default_endpoint().to_string();
            }
            self.model.provider = provider;
        }
        if let Some(value) = lookup("ANALYST_MODEL_ENDPOINT") {
            self.model.endpoint = value;
        }
        if let Some(value) = lookup("ANALYST_SQL_MODEL") {
            self.model.sql_model = value;
        }
        if let Some(value) = lookup("ANALYST_INSIGHT_MODEL") {
            self.model.insight_model = value;
        }
        if let Some(value) = lookup("ANALYST_API_KEY") {
            self.model.api_key = Some(value);
        }
        if let Some(value) = lookup("ANALYST_PREVIEW_LIMIT") {
            self.pipeline.preview_limit = parse_value("ANALYST_PREVIEW_LIMIT", &value)?;
        }
        if let Some(value) = lookup("ANALYST_BATCH_SIZE") {
            self.pipeline.batch_size = parse_value("ANALYST_BATCH_SIZE", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key().is_none() {
            return Err(ConfigError::Invalid(
                "Missing model API key (set ANALYST_API_KEY)".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.pipeline.batch_size == 0 || self.pipeline.sample_size == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.batch_size and pipeline.sample_size must be at least 1".to_string(),
            ));
        }
        if let Some(origin) = self
            .server
            .cors_origins
            .iter()
            .find(|o| !(o.starts_with("http://") || o.starts_with("https://")))
        {
            return Err(ConfigError::InvalidValue {
                key: "server.cors_origins".to_string(),
                value: origin.clone(),
            });
        }
        if self.model.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("model.endpoint is empty".to_string()));
        }
        Ok(())
    }

    /// Non-blank API key, if configured.
    pub fn api_key(&self) -> Option<&str> {
        self.model
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn analyst_settings(&self) -> AnalystSettings {
        AnalystSettings {
            preview_limit: self.pipeline.preview_limit,
            sql_params: CompletionParams {
                max_tokens: self.model.sql_max_tokens,
                temperature: self.model.sql_temperature,
            },
            insight_params: CompletionParams {
                max_tokens: self.model.insight_max_tokens,
                temperature: self.model.insight_temperature,
            },
            gate_policy: GatePolicy {
                allow_multiple_statements: self.pipeline.allow_multiple_statements,
            },
            batch_size: self.pipeline.batch_size,
            sample_size: self.pipeline.sample_size,
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.preview_limit, 5);
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.model.provider, ModelProvider::HuggingFace);
        assert_eq!(config.model.sql_model, "defog/sqlcoder-7b-2");
        assert!(!config.pipeline.allow_multiple_statements);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [server]
            bind = "0.0.0.0:8080"

            [pipeline]
            preview_limit = 10
            allow_multiple_statements = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.pipeline.preview_limit, 10);
        assert_eq!(config.pipeline.batch_size, 100);
        assert!(config.analyst_settings().gate_policy.allow_multiple_statements);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml_str("[server\nbind = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                ("ANALYST_MODEL_PROVIDER", "openai"),
                ("ANALYST_SQL_MODEL", "gpt-4o-mini"),
                ("ANALYST_API_KEY", "sk-test"),
                ("ANALYST_PREVIEW_LIMIT", "3"),
                ("ANALYST_POOL_SIZE", "4"),
            ]))
            .unwrap();

        assert_eq!(config.model.provider, ModelProvider::OpenAi);
        assert_eq!(config.model.endpoint, "https://api.openai.com/v1");
        assert_eq!(config.model.sql_model, "gpt-4o-mini");
        assert_eq!(config.api_key(), Some("sk-test"));
        assert_eq!(config.analyst_settings().preview_limit, 3);
        assert_eq!(config.database.pool_config().max_connections, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_endpoint_survives_provider_change() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                ("ANALYST_MODEL_ENDPOINT", "http://localhost:11434/v1"),
                ("ANALYST_MODEL_PROVIDER", "openai"),
            ]))
            .unwrap();
        assert_eq!(config.model.endpoint, "http://localhost:11434/v1");
    }

    #[test]
    fn test_invalid_override_is_reported() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(env(&[("ANALYST_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("ANALYST_BATCH_SIZE"));

        let err = config
            .apply_overrides(env(&[("ANALYST_MODEL_PROVIDER", "gemini")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_bad_cors_origin_fails_validation() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("key".to_string());
        config.server.cors_origins.push("localhost:3000".to_string());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("localhost:3000"));
    }

    #[test]
    fn test_missing_api_key_fails_validation() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.model.api_key = Some("   ".to_string());
        assert!(config.validate().is_err());
    }
}
