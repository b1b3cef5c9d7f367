//! Default resolution.
//!
//! Pure functions: nothing here reads or writes storage. Callers load the
//! rows and pass them in, which keeps the same code usable for cascaded
//! values, backfilled rows and projection blobs.

use serde::Serialize;

use crate::db::models::{
    ChatbotProvider, CourseSettings, FieldValue, OrganizationSettings, SettingsField,
};

pub const SYSTEM_DEFAULT_PROMPT: &str = "You are a course help assistant for a university course. \
Answer student questions using the course materials you are given. If the materials do not \
cover a question, say so instead of guessing, and suggest the student ask course staff.";
pub const SYSTEM_DEFAULT_TEMPERATURE: f64 = 0.7;
pub const SYSTEM_DEFAULT_TOP_K: i64 = 5;
pub const SYSTEM_DEFAULT_SIMILARITY_THRESHOLD_DOCUMENTS: f64 = 0.55;
pub const SYSTEM_DEFAULT_SIMILARITY_THRESHOLD_QUESTIONS: f64 = 0.9;

/// The value every field falls back to for one organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDefaults {
    /// `None` while the organization has no default provider, or that
    /// provider has no default model.
    pub llm_id: Option<String>,
    pub prompt: String,
    pub temperature: f64,
    pub top_k: i64,
    pub similarity_threshold_documents: f64,
    pub similarity_threshold_questions: f64,
}

impl ResolvedDefaults {
    pub fn system() -> Self {
        Self {
            llm_id: None,
            prompt: SYSTEM_DEFAULT_PROMPT.to_string(),
            temperature: SYSTEM_DEFAULT_TEMPERATURE,
            top_k: SYSTEM_DEFAULT_TOP_K,
            similarity_threshold_documents: SYSTEM_DEFAULT_SIMILARITY_THRESHOLD_DOCUMENTS,
            similarity_threshold_questions: SYSTEM_DEFAULT_SIMILARITY_THRESHOLD_QUESTIONS,
        }
    }

    pub fn get(&self, field: SettingsField) -> Option<FieldValue> {
        match field {
            SettingsField::Model => self.llm_id.clone().map(FieldValue::Text),
            SettingsField::Prompt => Some(FieldValue::Text(self.prompt.clone())),
            SettingsField::Temperature => Some(FieldValue::Real(self.temperature)),
            SettingsField::TopK => Some(FieldValue::Integer(self.top_k)),
            SettingsField::SimilarityThresholdDocuments => {
                Some(FieldValue::Real(self.similarity_threshold_documents))
            }
            SettingsField::SimilarityThresholdQuestions => {
                Some(FieldValue::Real(self.similarity_threshold_questions))
            }
        }
    }
}

/// Resolve the defaults for an organization.
///
/// `default_provider` must be the provider named by
/// `org.default_provider_id`; passing any other provider is a caller bug.
pub fn resolve_defaults(
    org: &OrganizationSettings,
    default_provider: Option<&ChatbotProvider>,
) -> ResolvedDefaults {
    let mut resolved = ResolvedDefaults::system();

    if let Some(ref prompt) = org.default_prompt {
        resolved.prompt = prompt.clone();
    }
    if let Some(v) = org.default_temperature {
        resolved.temperature = v;
    }
    if let Some(v) = org.default_top_k {
        resolved.top_k = v;
    }
    if let Some(v) = org.default_similarity_threshold_documents {
        resolved.similarity_threshold_documents = v;
    }
    if let Some(v) = org.default_similarity_threshold_questions {
        resolved.similarity_threshold_questions = v;
    }
    resolved.llm_id = default_provider.and_then(|p| p.default_model_id.clone());

    resolved
}

/// A course's fully materialized configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub llm_id: Option<String>,
    pub prompt: String,
    pub temperature: f64,
    pub top_k: i64,
    pub similarity_threshold_documents: f64,
    pub similarity_threshold_questions: f64,
}

pub fn resolve_effective(course: &CourseSettings, defaults: &ResolvedDefaults) -> EffectiveConfig {
    fn pick<T: Clone>(using_default: bool, default: &T, own: &T) -> T {
        if using_default {
            default.clone()
        } else {
            own.clone()
        }
    }

    EffectiveConfig {
        llm_id: pick(course.using_default_model, &defaults.llm_id, &course.llm_id),
        prompt: pick(course.using_default_prompt, &defaults.prompt, &course.prompt),
        temperature: pick(
            course.using_default_temperature,
            &defaults.temperature,
            &course.temperature,
        ),
        top_k: pick(course.using_default_top_k, &defaults.top_k, &course.top_k),
        similarity_threshold_documents: pick(
            course.using_default_similarity_threshold_documents,
            &defaults.similarity_threshold_documents,
            &course.similarity_threshold_documents,
        ),
        similarity_threshold_questions: pick(
            course.using_default_similarity_threshold_questions,
            &defaults.similarity_threshold_questions,
            &course.similarity_threshold_questions,
        ),
    }
}

/// Fields of `course` whose flag is set but whose stored value has drifted
/// from `defaults`. Empty whenever the inheritance invariant holds.
pub fn stale_default_fields(
    course: &CourseSettings,
    defaults: &ResolvedDefaults,
) -> Vec<SettingsField> {
    SettingsField::ALL
        .into_iter()
        .filter(|field| course.uses_default(*field))
        .filter(|field| course.value_of(*field) != defaults.get(*field))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn org() -> OrganizationSettings {
        OrganizationSettings {
            id: "org-settings".into(),
            organization_id: 1,
            default_provider_id: Some("provider".into()),
            default_prompt: None,
            default_temperature: Some(0.3),
            default_top_k: None,
            default_similarity_threshold_documents: None,
            default_similarity_threshold_questions: Some(0.8),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn provider(default_model: Option<&str>) -> ChatbotProvider {
        ChatbotProvider {
            id: "provider".into(),
            org_settings_id: "org-settings".into(),
            provider_type: "ollama".into(),
            nickname: None,
            base_url: None,
            headers: HashMap::new(),
            api_key: None,
            default_model_id: default_model.map(String::from),
            default_vision_model_id: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn course(defaults: &ResolvedDefaults) -> CourseSettings {
        CourseSettings {
            id: "cs".into(),
            course_id: 7,
            org_settings_id: "org-settings".into(),
            llm_id: defaults.llm_id.clone(),
            prompt: defaults.prompt.clone(),
            temperature: defaults.temperature,
            top_k: defaults.top_k,
            similarity_threshold_documents: defaults.similarity_threshold_documents,
            similarity_threshold_questions: defaults.similarity_threshold_questions,
            using_default_model: true,
            using_default_prompt: true,
            using_default_temperature: true,
            using_default_top_k: true,
            using_default_similarity_threshold_documents: true,
            using_default_similarity_threshold_questions: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_org_values_overlay_system_defaults() {
        let resolved = resolve_defaults(&org(), Some(&provider(Some("m1"))));
        assert_eq!(resolved.llm_id.as_deref(), Some("m1"));
        assert_eq!(resolved.prompt, SYSTEM_DEFAULT_PROMPT);
        assert_eq!(resolved.temperature, 0.3);
        assert_eq!(resolved.top_k, SYSTEM_DEFAULT_TOP_K);
        assert_eq!(
            resolved.similarity_threshold_documents,
            SYSTEM_DEFAULT_SIMILARITY_THRESHOLD_DOCUMENTS
        );
        assert_eq!(resolved.similarity_threshold_questions, 0.8);
    }

    #[test]
    fn test_model_absent_without_provider_default() {
        assert_eq!(resolve_defaults(&org(), None).llm_id, None);
        assert_eq!(resolve_defaults(&org(), Some(&provider(None))).llm_id, None);
    }

    #[test]
    fn test_effective_mixes_overrides_and_defaults() {
        let defaults = resolve_defaults(&org(), Some(&provider(Some("m1"))));
        let mut row = course(&defaults);
        row.using_default_temperature = false;
        row.temperature = 0.95;
        row.using_default_model = false;
        row.llm_id = Some("m2".into());
        // Stale value behind a set flag is ignored in favour of the default
        row.top_k = 42;

        let effective = resolve_effective(&row, &defaults);
        assert_eq!(effective.temperature, 0.95);
        assert_eq!(effective.llm_id.as_deref(), Some("m2"));
        assert_eq!(effective.top_k, SYSTEM_DEFAULT_TOP_K);
        assert_eq!(effective.similarity_threshold_questions, 0.8);

        assert_eq!(stale_default_fields(&row, &defaults), vec![SettingsField::TopK]);
    }
}
