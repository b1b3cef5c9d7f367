use std::collections::HashMap;

use crate::error::AppError;

/// Provider types the chatbot service knows how to talk to.
pub const PROVIDER_TYPES: &[&str] = &["openai", "anthropic", "ollama", "openai_compatible"];

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

pub fn require_valid_id(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must be a valid ID")));
    }
    Ok(())
}

/// Shared check for temperature and both similarity thresholds.
pub fn require_unit_interval(field: &str, value: f64) -> Result<(), AppError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(AppError::Validation(format!("{field} must be between 0 and 1")));
    }
    Ok(())
}

pub fn require_top_k(value: i64) -> Result<(), AppError> {
    if value < 1 {
        return Err(AppError::Validation("top_k must be >= 1".into()));
    }
    Ok(())
}

pub fn require_provider_type(value: &str) -> Result<(), AppError> {
    if !PROVIDER_TYPES.contains(&value) {
        return Err(AppError::Validation(format!(
            "Unknown provider type '{value}' (expected one of: {})",
            PROVIDER_TYPES.join(", ")
        )));
    }
    Ok(())
}

pub fn require_base_url(value: &str) -> Result<(), AppError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| AppError::Validation(format!("Invalid base_url '{value}': {e}")))
}

pub fn require_header_names(headers: &HashMap<String, String>) -> Result<(), AppError> {
    if headers.keys().any(|k| k.trim().is_empty()) {
        return Err(AppError::Validation("Header names cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_interval() {
        assert!(require_unit_interval("temperature", 0.0).is_ok());
        assert!(require_unit_interval("temperature", 1.0).is_ok());
        assert!(require_unit_interval("temperature", 1.01).is_err());
        assert!(require_unit_interval("temperature", -0.1).is_err());
        assert!(require_unit_interval("temperature", f64::NAN).is_err());
    }

    #[test]
    fn test_provider_type_and_url() {
        assert!(require_provider_type("ollama").is_ok());
        assert!(require_provider_type("gpt").is_err());
        assert!(require_base_url("http://localhost:11434").is_ok());
        assert!(require_base_url("not a url").is_err());
    }
}
