use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Overridable fields
// ============================================================================

/// A course-level field that can either track its resolved default or hold an
/// explicit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsField {
    Model,
    Prompt,
    Temperature,
    TopK,
    SimilarityThresholdDocuments,
    SimilarityThresholdQuestions,
}

impl SettingsField {
    pub const ALL: [SettingsField; 6] = [
        SettingsField::Model,
        SettingsField::Prompt,
        SettingsField::Temperature,
        SettingsField::TopK,
        SettingsField::SimilarityThresholdDocuments,
        SettingsField::SimilarityThresholdQuestions,
    ];

    /// Value column on `course_settings`.
    pub fn column(self) -> &'static str {
        match self {
            SettingsField::Model => "llm_id",
            SettingsField::Prompt => "prompt",
            SettingsField::Temperature => "temperature",
            SettingsField::TopK => "top_k",
            SettingsField::SimilarityThresholdDocuments => "similarity_threshold_documents",
            SettingsField::SimilarityThresholdQuestions => "similarity_threshold_questions",
        }
    }

    /// `using_default_*` flag column on `course_settings`.
    pub fn flag_column(self) -> &'static str {
        match self {
            SettingsField::Model => "using_default_model",
            SettingsField::Prompt => "using_default_prompt",
            SettingsField::Temperature => "using_default_temperature",
            SettingsField::TopK => "using_default_top_k",
            SettingsField::SimilarityThresholdDocuments => {
                "using_default_similarity_threshold_documents"
            }
            SettingsField::SimilarityThresholdQuestions => {
                "using_default_similarity_threshold_questions"
            }
        }
    }
}

impl fmt::Display for SettingsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A concrete value for one `SettingsField`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Real(f64),
    Integer(i64),
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            FieldValue::Text(v) => v.to_sql(),
            FieldValue::Real(v) => v.to_sql(),
            FieldValue::Integer(v) => v.to_sql(),
        }
    }
}

// ============================================================================
// Course Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSettings {
    pub id: String,
    pub course_id: i64,
    pub org_settings_id: String,
    pub llm_id: Option<String>,
    pub prompt: String,
    pub temperature: f64,
    pub top_k: i64,
    pub similarity_threshold_documents: f64,
    pub similarity_threshold_questions: f64,
    pub using_default_model: bool,
    pub using_default_prompt: bool,
    pub using_default_temperature: bool,
    pub using_default_top_k: bool,
    pub using_default_similarity_threshold_documents: bool,
    pub using_default_similarity_threshold_questions: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl CourseSettings {
    pub fn uses_default(&self, field: SettingsField) -> bool {
        match field {
            SettingsField::Model => self.using_default_model,
            SettingsField::Prompt => self.using_default_prompt,
            SettingsField::Temperature => self.using_default_temperature,
            SettingsField::TopK => self.using_default_top_k,
            SettingsField::SimilarityThresholdDocuments => {
                self.using_default_similarity_threshold_documents
            }
            SettingsField::SimilarityThresholdQuestions => {
                self.using_default_similarity_threshold_questions
            }
        }
    }

    pub fn set_uses_default(&mut self, field: SettingsField, using_default: bool) {
        match field {
            SettingsField::Model => self.using_default_model = using_default,
            SettingsField::Prompt => self.using_default_prompt = using_default,
            SettingsField::Temperature => self.using_default_temperature = using_default,
            SettingsField::TopK => self.using_default_top_k = using_default,
            SettingsField::SimilarityThresholdDocuments => {
                self.using_default_similarity_threshold_documents = using_default
            }
            SettingsField::SimilarityThresholdQuestions => {
                self.using_default_similarity_threshold_questions = using_default
            }
        }
    }

    /// Store `value` for `field`. A value of the wrong kind for the field is
    /// ignored; `None` only clears the model.
    pub fn set_value(&mut self, field: SettingsField, value: Option<FieldValue>) {
        match (field, value) {
            (SettingsField::Model, Some(FieldValue::Text(v))) => self.llm_id = Some(v),
            (SettingsField::Model, None) => self.llm_id = None,
            (SettingsField::Prompt, Some(FieldValue::Text(v))) => self.prompt = v,
            (SettingsField::Temperature, Some(FieldValue::Real(v))) => self.temperature = v,
            (SettingsField::TopK, Some(FieldValue::Integer(v))) => self.top_k = v,
            (SettingsField::SimilarityThresholdDocuments, Some(FieldValue::Real(v))) => {
                self.similarity_threshold_documents = v
            }
            (SettingsField::SimilarityThresholdQuestions, Some(FieldValue::Real(v))) => {
                self.similarity_threshold_questions = v
            }
            (field, value) => {
                tracing::warn!(field = %field, ?value, "Ignoring value of the wrong kind");
            }
        }
    }

    /// Stored value for `field`. `None` only for a course without a model.
    pub fn value_of(&self, field: SettingsField) -> Option<FieldValue> {
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

/// Course-level write. Setting a value without its flag turns the field into
/// an explicit override; passing `using_default_* = Some(true)` resets the
/// field to its resolved default and ignores any value passed for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertCourseSettingsInput {
    pub llm_id: Option<String>,
    pub prompt: Option<String>,
    pub temperature: Option<f64>,
    pub top_k: Option<i64>,
    pub similarity_threshold_documents: Option<f64>,
    pub similarity_threshold_questions: Option<f64>,
    pub using_default_model: Option<bool>,
    pub using_default_prompt: Option<bool>,
    pub using_default_temperature: Option<bool>,
    pub using_default_top_k: Option<bool>,
    pub using_default_similarity_threshold_documents: Option<bool>,
    pub using_default_similarity_threshold_questions: Option<bool>,
}

impl UpsertCourseSettingsInput {
    pub fn explicit_value(&self, field: SettingsField) -> Option<FieldValue> {
        match field {
            SettingsField::Model => self.llm_id.clone().map(FieldValue::Text),
            SettingsField::Prompt => self.prompt.clone().map(FieldValue::Text),
            SettingsField::Temperature => self.temperature.map(FieldValue::Real),
            SettingsField::TopK => self.top_k.map(FieldValue::Integer),
            SettingsField::SimilarityThresholdDocuments => {
                self.similarity_threshold_documents.map(FieldValue::Real)
            }
            SettingsField::SimilarityThresholdQuestions => {
                self.similarity_threshold_questions.map(FieldValue::Real)
            }
        }
    }

    pub fn default_flag(&self, field: SettingsField) -> Option<bool> {
        match field {
            SettingsField::Model => self.using_default_model,
            SettingsField::Prompt => self.using_default_prompt,
            SettingsField::Temperature => self.using_default_temperature,
            SettingsField::TopK => self.using_default_top_k,
            SettingsField::SimilarityThresholdDocuments => {
                self.using_default_similarity_threshold_documents
            }
            SettingsField::SimilarityThresholdQuestions => {
                self.using_default_similarity_threshold_questions
            }
        }
    }
}
