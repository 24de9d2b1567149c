pub mod api;
pub mod config;
pub mod db;
pub mod emr;
pub mod models;
pub mod pipeline;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api::ApiContext;
use crate::config::{AppConfig, ConfigError};
use crate::db::DatabaseError;
use crate::pipeline::analysis::{AzureOpenAiClient, ConversationAnalyzer};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Service entry point: load configuration, migrate the database, serve the
/// API until Ctrl-C.
pub fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("EMR scribe starting v{}", config::APP_VERSION);

    let config = AppConfig::from_env()?;

    // Create and migrate before serving.
    db::open_database(&config.database_path)?;
    tracing::info!(path = %config.database_path.display(), "Database ready");

    let llm = AzureOpenAiClient::new(config.llm.clone());
    let analyzer = ConversationAnalyzer::new(Box::new(llm), &config.llm.deployment);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, analyzer))
}

async fn serve(config: AppConfig, analyzer: ConversationAnalyzer) -> Result<(), StartupError> {
    let addr = config.bind_addr;
    let ctx = ApiContext::new(config, analyzer);
    let mut server = api::start_api_server(ctx, addr).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {e}");
    }

    server.shutdown();
    server.wait().await;
    Ok(())
}
