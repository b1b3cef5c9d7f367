use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Projected course settings (wire shape shared by the API and replica table)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDescriptor {
    pub id: String,
    pub organization_id: i64,
    pub default_provider_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    #[serde(rename = "type")]
    pub provider_type: String,
    /// Sorted so that the serialized form is stable across writes.
    pub headers: BTreeMap<String, String>,
    pub base_url: Option<String>,
    pub model_name: String,
    pub default_model_name: Option<String>,
    pub default_vision_model_name: Option<String>,
}

/// A course's effective configuration as the chatbot service stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSettingsMetadata {
    pub organization_settings: OrganizationDescriptor,
    pub model: Option<ModelDescriptor>,
    pub prompt: String,
    pub temperature: f64,
    pub top_k: i64,
    pub similarity_threshold_documents: f64,
    pub similarity_threshold_questions: f64,
}

impl CourseSettingsMetadata {
    /// Without a model the chatbot cannot answer anything, so there is
    /// nothing worth creating remotely.
    pub fn is_trivial(&self) -> bool {
        self.model.is_none()
    }

    /// JSON value as it reads back from storage. Going through the text form
    /// makes float comparison against a stored row exact.
    pub fn to_stored_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        let text = serde_json::to_string(self)?;
        serde_json::from_str(&text)
    }
}

/// Request body for create/update calls.
#[derive(Serialize)]
pub(crate) struct MetadataBody<'a> {
    pub metadata: &'a CourseSettingsMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_is_camel_case() {
        let metadata = CourseSettingsMetadata {
            organization_settings: OrganizationDescriptor {
                id: "os".into(),
                organization_id: 3,
                default_provider_id: Some("p".into()),
            },
            model: Some(ModelDescriptor {
                provider_type: "ollama".into(),
                headers: BTreeMap::new(),
                base_url: Some("http://localhost:11434".into()),
                model_name: "llama3".into(),
                default_model_name: Some("llama3".into()),
                default_vision_model_name: None,
            }),
            prompt: "p".into(),
            temperature: 0.7,
            top_k: 5,
            similarity_threshold_documents: 0.55,
            similarity_threshold_questions: 0.9,
        };
        let json = metadata.to_stored_value().unwrap();
        assert_eq!(json["organizationSettings"]["organizationId"], 3);
        assert_eq!(json["model"]["type"], "ollama");
        assert_eq!(json["model"]["baseUrl"], "http://localhost:11434");
        assert_eq!(json["model"]["defaultModelName"], "llama3");
        assert_eq!(json["topK"], 5);
        assert_eq!(json["similarityThresholdDocuments"], 0.55);
        assert!(!metadata.is_trivial());
    }
}
