pub mod chatbot;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod validation;

use std::sync::Arc;

use chatbot::{ChatbotClient, ReplicaStore};
use config::EngineConfig;
use engine::{ProjectionReport, SettingsEngine};
use error::AppError;

/// Build the engine from the environment and run one full projection pass.
pub async fn run() -> Result<ProjectionReport, AppError> {
    logging::init();

    tracing::info!("Starting coursebot-settings v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::from_env()?;
    let pool = db::init_db(&config.data_dir)?;
    let replica = ReplicaStore::new(db::init_replica_db(&config.replica_db)?);
    let client = ChatbotClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.api_timeout,
    )?;
    tracing::info!(
        api_url = %config.api_url,
        timeout_secs = config.api_timeout.as_secs(),
        "Chatbot client ready"
    );

    let engine = SettingsEngine::new(pool, Arc::new(client), replica);
    let report = engine.resync_all().await?;

    tracing::info!(
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        fallback = report.fallback_writes,
        failed = report.failed,
        "Resync complete"
    );
    Ok(report)
}
