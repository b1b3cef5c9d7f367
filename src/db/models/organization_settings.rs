use serde::{Deserialize, Serialize};

use super::CreateProviderInput;

// ============================================================================
// Organization Settings
// ============================================================================

/// Organization-level chatbot defaults. `None` on any `default_*` column means
/// "fall back to the system default".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    pub id: String,
    pub organization_id: i64,
    pub default_provider_id: Option<String>,
    pub default_prompt: Option<String>,
    pub default_temperature: Option<f64>,
    pub default_top_k: Option<i64>,
    pub default_similarity_threshold_documents: Option<f64>,
    pub default_similarity_threshold_questions: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Organization settings are always created together with their first
/// provider, which becomes the default provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganizationSettingsInput {
    pub default_provider: CreateProviderInput,
    pub default_prompt: Option<String>,
    pub default_temperature: Option<f64>,
    pub default_top_k: Option<i64>,
    pub default_similarity_threshold_documents: Option<f64>,
    pub default_similarity_threshold_questions: Option<f64>,
}

/// `Some(None)` clears a default back to the system value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrganizationSettingsInput {
    pub default_provider_id: Option<String>,
    pub default_prompt: Option<Option<String>>,
    pub default_temperature: Option<Option<f64>>,
    pub default_top_k: Option<Option<i64>>,
    pub default_similarity_threshold_documents: Option<Option<f64>>,
    pub default_similarity_threshold_questions: Option<Option<f64>>,
}

impl OrganizationSettings {
    /// The row as it would look after `input` is applied.
    pub fn merged_with(&self, input: &UpdateOrganizationSettingsInput) -> OrganizationSettings {
        let mut next = self.clone();
        if let Some(ref v) = input.default_provider_id {
            next.default_provider_id = Some(v.clone());
        }
        if let Some(ref v) = input.default_prompt {
            next.default_prompt = v.clone();
        }
        if let Some(v) = input.default_temperature {
            next.default_temperature = v;
        }
        if let Some(v) = input.default_top_k {
            next.default_top_k = v;
        }
        if let Some(v) = input.default_similarity_threshold_documents {
            next.default_similarity_threshold_documents = v;
        }
        if let Some(v) = input.default_similarity_threshold_questions {
            next.default_similarity_threshold_questions = v;
        }
        next
    }
}
