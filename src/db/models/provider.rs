use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Chatbot Provider
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatbotProvider {
    pub id: String,
    pub org_settings_id: String,
    /// One of `validation::PROVIDER_TYPES`.
    pub provider_type: String,
    pub nickname: Option<String>,
    pub base_url: Option<String>,
    pub headers: HashMap<String, String>,
    pub api_key: Option<String>,
    pub default_model_id: Option<String>,
    pub default_vision_model_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A provider is created with its model catalogue. The default models are
/// named rather than referenced by id since the ids do not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProviderInput {
    pub provider_type: String,
    pub nickname: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub api_key: Option<String>,
    pub models: Vec<CreateModelInput>,
    pub default_model_name: String,
    pub default_vision_model_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProviderInput {
    pub nickname: Option<Option<String>>,
    pub base_url: Option<Option<String>>,
    pub headers: Option<HashMap<String, String>>,
    pub api_key: Option<Option<String>>,
    pub default_model_id: Option<Option<String>>,
    pub default_vision_model_id: Option<Option<String>>,
}

impl ChatbotProvider {
    pub fn merged_with(&self, input: &UpdateProviderInput) -> ChatbotProvider {
        let mut next = self.clone();
        if let Some(ref v) = input.nickname {
            next.nickname = v.clone();
        }
        if let Some(ref v) = input.base_url {
            next.base_url = v.clone();
        }
        if let Some(ref v) = input.headers {
            next.headers = v.clone();
        }
        if let Some(ref v) = input.api_key {
            next.api_key = v.clone();
        }
        if let Some(ref v) = input.default_model_id {
            next.default_model_id = v.clone();
        }
        if let Some(ref v) = input.default_vision_model_id {
            next.default_vision_model_id = v.clone();
        }
        next
    }

    /// True when any column that ends up in a course projection differs.
    pub fn projection_differs(&self, other: &ChatbotProvider) -> bool {
        self.provider_type != other.provider_type
            || self.base_url != other.base_url
            || self.headers != other.headers
            || self.default_model_id != other.default_model_id
            || self.default_vision_model_id != other.default_vision_model_id
    }
}

// ============================================================================
// Provider Model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderModel {
    pub id: String,
    pub provider_id: String,
    pub model_name: String,
    pub is_text: bool,
    pub is_vision: bool,
    pub is_thinking: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateModelInput {
    pub model_name: String,
    pub is_text: Option<bool>,
    pub is_vision: Option<bool>,
    pub is_thinking: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateModelInput {
    pub model_name: Option<String>,
    pub is_text: Option<bool>,
    pub is_vision: Option<bool>,
    pub is_thinking: Option<bool>,
}

impl CreateModelInput {
    pub fn named(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            is_text: None,
            is_vision: None,
            is_thinking: None,
        }
    }
}
