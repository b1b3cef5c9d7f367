use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;
use crate::validation::require_base_url;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_REPLICA_FILE: &str = "chatbot.db";
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the primary settings database.
    pub data_dir: PathBuf,
    /// The chatbot service's database, written directly only while its API is down.
    pub replica_db: PathBuf,
    pub api_url: String,
    pub api_key: String,
    pub api_timeout: Duration,
}

impl EngineConfig {
    /// Load from the process environment. A `.env` file in the working
    /// directory is applied first if present.
    pub fn from_env() -> Result<Self, AppError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(get: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let data_dir =
            PathBuf::from(var("COURSEBOT_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));
        let replica_db = var("CHATBOT_REPLICA_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DEFAULT_REPLICA_FILE));

        let api_url = var("CHATBOT_API_URL")
            .ok_or_else(|| AppError::Config("CHATBOT_API_URL not configured".into()))?;
        require_base_url(&api_url).map_err(|e| AppError::Config(format!("CHATBOT_API_URL: {e}")))?;
        let api_key = var("CHATBOT_API_KEY")
            .ok_or_else(|| AppError::Config("CHATBOT_API_KEY not configured".into()))?;

        let timeout_secs = match var("CHATBOT_API_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                AppError::Config(format!(
                    "CHATBOT_API_TIMEOUT_SECS must be a whole number of seconds, got '{raw}'"
                ))
            })?,
            None => DEFAULT_API_TIMEOUT_SECS,
        };

        Ok(Self {
            data_dir,
            replica_db,
            api_url,
            api_key,
            api_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
