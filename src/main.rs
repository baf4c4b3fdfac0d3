use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use data_analyst::llm::HttpCompletionClient;
use data_analyst::store::SqliteStore;
use data_analyst::{server, Analyst, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("data_analyst=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let api_key = config
        .api_key()
        .context("Missing model API key")?
        .to_string();

    let store = SqliteStore::open(&config.database.path, config.database.pool_config())
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;

    let sql_model = HttpCompletionClient::new(
        config.model.provider,
        config.model.endpoint.clone(),
        config.model.sql_model.clone(),
        api_key.clone(),
        config.model.timeout(),
    )?;
    let insight_model = HttpCompletionClient::new(
        config.model.provider,
        config.model.endpoint.clone(),
        config.model.insight_model.clone(),
        api_key,
        config.model.timeout(),
    )?;

    tracing::info!(
        "Using {} models {} (SQL) and {} (insight)",
        config.model.provider.as_str(),
        sql_model.model(),
        insight_model.model()
    );

    let analyst = Arc::new(Analyst::new(
        Arc::new(store),
        Arc::new(sql_model),
        Arc::new(insight_model),
        config.analyst_settings(),
    ));

    server::serve(
        config.server.bind,
        analyst,
        config.server.max_upload_bytes,
        &config.server.cors_origins,
    )
    .await
    .context("HTTP server failed")?;

    Ok(())
}
