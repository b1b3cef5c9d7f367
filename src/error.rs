use serde::Serialize;

/// Crate-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes cleanly so callers forwarding it get structured error messages.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network offline: {0}")]
    NetworkOffline(String),

    #[error("Chatbot API error ({status}): {message}")]
    ChatbotApi { status: u16, message: String },
}

impl AppError {
    /// True when the chatbot service could not serve the request at all:
    /// a 500 response or a request that never got a response.
    pub fn is_service_unreachable(&self) -> bool {
        match self {
            AppError::ChatbotApi { status, .. } => *status == 500,
            AppError::NetworkOffline(_) => true,
            _ => false,
        }
    }
}

/// We serialize as `{ error: "...", kind: "..." }` for callers that forward errors.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field(
            "kind",
            match self {
                AppError::Database(_) => "database",
                AppError::Pool(_) => "pool",
                AppError::NotFound(_) => "not_found",
                AppError::Validation(_) => "validation",
                AppError::Io(_) => "io",
                AppError::Serde(_) => "serde",
                AppError::Config(_) => "config",
                AppError::NetworkOffline(_) => "network_offline",
                AppError::ChatbotApi { .. } => "chatbot_api",
            },
        )?;
        s.end()
    }
}
