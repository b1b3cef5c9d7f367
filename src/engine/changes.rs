//! Transactional half of every settings write.
//!
//! Every function here runs on the open transaction, performs the write and
//! its cascade, and reports which course projections must be refreshed or
//! removed. Nothing here talks to the chatbot service.

use std::collections::BTreeSet;

use rusqlite::Connection;

use crate::db::models::{
    ChatbotProvider, CourseSettings, CreateModelInput, CreateOrganizationSettingsInput,
    CreateProviderInput, OrganizationSettings, ProviderModel, SettingsField, UpdateModelInput,
    UpdateOrganizationSettingsInput, UpdateProviderInput, UpsertCourseSettingsInput,
};
use crate::db::repos::{
    course_settings as course_repo, courses, llm_models, organization_settings, organizations,
    providers,
};
use crate::engine::cascade::{self, CascadeOutcome};
use crate::engine::reassign;
use crate::engine::resolve::{resolve_defaults, ResolvedDefaults};
use crate::error::AppError;
use crate::validation::{
    require_base_url, require_header_names, require_non_empty, require_provider_type,
    require_top_k, require_unit_interval, require_valid_id,
};

/// What a committed write means for the chatbot service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsChange {
    /// Course settings rows whose projection must be recomputed.
    pub course_settings_ids: BTreeSet<String>,
    /// Courses whose projection must be removed.
    pub removed_course_ids: BTreeSet<i64>,
    pub cascade: CascadeOutcome,
}

impl SettingsChange {
    pub fn is_empty(&self) -> bool {
        self.course_settings_ids.is_empty() && self.removed_course_ids.is_empty()
    }
}

impl From<CascadeOutcome> for SettingsChange {
    fn from(cascade: CascadeOutcome) -> Self {
        Self {
            course_settings_ids: cascade.course_settings_ids.clone(),
            removed_course_ids: BTreeSet::new(),
            cascade,
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn validate_values(
    prompt: Option<&str>,
    temperature: Option<f64>,
    top_k: Option<i64>,
    similarity_threshold_documents: Option<f64>,
    similarity_threshold_questions: Option<f64>,
) -> Result<(), AppError> {
    if let Some(prompt) = prompt {
        require_non_empty("prompt", prompt)?;
    }
    if let Some(v) = temperature {
        require_unit_interval("temperature", v)?;
    }
    if let Some(v) = top_k {
        require_top_k(v)?;
    }
    if let Some(v) = similarity_threshold_documents {
        require_unit_interval("similarity_threshold_documents", v)?;
    }
    if let Some(v) = similarity_threshold_questions {
        require_unit_interval("similarity_threshold_questions", v)?;
    }
    Ok(())
}

fn load_default_provider(
    conn: &Connection,
    org: &OrganizationSettings,
) -> Result<Option<ChatbotProvider>, AppError> {
    match org.default_provider_id {
        Some(ref id) => Ok(Some(providers::find(conn, id)?)),
        None => Ok(None),
    }
}

/// A fresh row that inherits every field.
fn inheriting_row(
    course_id: i64,
    org_settings_id: &str,
    defaults: &ResolvedDefaults,
) -> CourseSettings {
    let now = chrono::Utc::now().to_rfc3339();
    CourseSettings {
        id: uuid::Uuid::new_v4().to_string(),
        course_id,
        org_settings_id: org_settings_id.to_string(),
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
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Insert a provider with its model catalogue and point its defaults at the
/// named models.
fn insert_provider(
    conn: &Connection,
    org_settings_id: &str,
    input: &CreateProviderInput,
) -> Result<ChatbotProvider, AppError> {
    require_provider_type(&input.provider_type)?;
    if let Some(ref url) = input.base_url {
        require_base_url(url)?;
    }
    require_header_names(&input.headers)?;
    if input.models.is_empty() {
        return Err(AppError::Validation("A provider needs at least one model".into()));
    }

    let provider = providers::insert(
        conn,
        org_settings_id,
        &input.provider_type,
        input.nickname.as_deref(),
        input.base_url.as_deref(),
        &input.headers,
        input.api_key.as_deref(),
    )?;

    let default_name = input.default_model_name.trim();
    let vision_name = input.default_vision_model_name.as_deref().map(str::trim);
    let mut default_model_id = None;
    let mut default_vision_model_id = None;

    for model_input in &input.models {
        let model = llm_models::insert(conn, &provider.id, model_input)?;
        if model.model_name == default_name {
            default_model_id = Some(model.id.clone());
        }
        if vision_name == Some(model.model_name.as_str()) {
            if !model.is_vision {
                return Err(AppError::Validation(format!(
                    "Default vision model '{}' does not support vision",
                    model.model_name
                )));
            }
            default_vision_model_id = Some(model.id.clone());
        }
    }

    let default_model_id = default_model_id.ok_or_else(|| {
        AppError::Validation(format!("Default model '{default_name}' is not in the model list"))
    })?;
    if let (Some(name), None) = (vision_name, &default_vision_model_id) {
        return Err(AppError::Validation(format!(
            "Default vision model '{name}' is not in the model list"
        )));
    }

    providers::write(
        conn,
        &provider.id,
        &UpdateProviderInput {
            default_model_id: Some(Some(default_model_id)),
            default_vision_model_id: default_vision_model_id.map(Some),
            ..Default::default()
        },
    )?;
    providers::find(conn, &provider.id)
}

/// Make sure `model_id` is a model of `provider`, optionally one with vision.
fn require_provider_model(
    conn: &Connection,
    provider: &ChatbotProvider,
    model_id: &str,
    vision: bool,
) -> Result<ProviderModel, AppError> {
    let model = llm_models::find(conn, model_id)?;
    if model.provider_id != provider.id {
        return Err(AppError::Validation(format!(
            "Model '{}' does not belong to this provider",
            model.model_name
        )));
    }
    if vision && !model.is_vision {
        return Err(AppError::Validation(format!(
            "Model '{}' does not support vision",
            model.model_name
        )));
    }
    Ok(model)
}

/// Course settings rows using any model of `provider_id`.
fn rows_on_provider(conn: &Connection, provider_id: &str) -> Result<Vec<String>, AppError> {
    let model_ids = llm_models::ids_for_provider(conn, provider_id)?;
    course_repo::ids_with_llm_in(conn, &model_ids)
}

// ── Organization settings ───────────────────────────────────────────

/// Create an organization's settings with its first provider as default and
/// backfill an inheriting row for every existing course.
pub fn create_organization_settings(
    conn: &Connection,
    organization_id: i64,
    input: &CreateOrganizationSettingsInput,
) -> Result<(OrganizationSettings, SettingsChange), AppError> {
    organizations::find(conn, organization_id)?;
    if organization_settings::find_for_organization(conn, organization_id)?.is_some() {
        return Err(AppError::Validation(format!(
            "Organization {organization_id} already has chatbot settings"
        )));
    }
    validate_values(
        input.default_prompt.as_deref(),
        input.default_temperature,
        input.default_top_k,
        input.default_similarity_threshold_documents,
        input.default_similarity_threshold_questions,
    )?;

    let settings = organization_settings::insert(
        conn,
        organization_id,
        input.default_prompt.as_deref(),
        input.default_temperature,
        input.default_top_k,
        input.default_similarity_threshold_documents,
        input.default_similarity_threshold_questions,
    )?;
    let provider = insert_provider(conn, &settings.id, &input.default_provider)?;
    organization_settings::write(
        conn,
        &settings.id,
        &UpdateOrganizationSettingsInput {
            default_provider_id: Some(provider.id.clone()),
            ..Default::default()
        },
    )?;
    let settings = organization_settings::find(conn, &settings.id)?;
    let defaults = resolve_defaults(&settings, Some(&provider));

    let mut change = SettingsChange::default();
    for course in courses::list_for_organization(conn, organization_id)? {
        let row = inheriting_row(course.id, &settings.id, &defaults);
        course_repo::insert(conn, &row)?;
        change.course_settings_ids.insert(row.id);
    }

    tracing::info!(
        organization_id,
        org_settings_id = %settings.id,
        backfilled = change.course_settings_ids.len(),
        "Created organization chatbot settings"
    );
    Ok((settings, change))
}

pub fn update_organization_settings(
    conn: &Connection,
    id: &str,
    input: &UpdateOrganizationSettingsInput,
) -> Result<(OrganizationSettings, SettingsChange), AppError> {
    validate_values(
        input.default_prompt.as_ref().and_then(|v| v.as_deref()),
        input.default_temperature.flatten(),
        input.default_top_k.flatten(),
        input.default_similarity_threshold_documents.flatten(),
        input.default_similarity_threshold_questions.flatten(),
    )?;

    let current = organization_settings::find(conn, id)?;
    if let Some(ref provider_id) = input.default_provider_id {
        require_valid_id("default_provider_id", provider_id)?;
        let provider = providers::find(conn, provider_id)?;
        if provider.org_settings_id != current.id {
            return Err(AppError::Validation(
                "Default provider must belong to this organization".into(),
            ));
        }
    }

    let incoming = current.merged_with(input);
    organization_settings::write(conn, id, input)?;

    let entries = cascade::plan_org_cascade(conn, &current, &incoming)?;
    let mut change = SettingsChange::from(cascade::apply(conn, entries)?);
    if current.default_provider_id != incoming.default_provider_id {
        // The organization descriptor in every projection changed
        change
            .course_settings_ids
            .extend(course_repo::ids_for_org_settings(conn, id)?);
    }

    Ok((organization_settings::find(conn, id)?, change))
}

/// Delete an organization's settings. Providers, models and course settings
/// go with it; every course loses its projection.
pub fn delete_organization_settings(
    conn: &Connection,
    id: &str,
) -> Result<SettingsChange, AppError> {
    organization_settings::find(conn, id)?;
    let course_ids = course_repo::course_ids_for_org_settings(conn, id)?;
    organization_settings::delete(conn, id)?;

    tracing::info!(
        org_settings_id = %id,
        courses = course_ids.len(),
        "Deleted organization chatbot settings"
    );
    Ok(SettingsChange {
        removed_course_ids: course_ids.into_iter().collect(),
        ..Default::default()
    })
}

// ── Providers ───────────────────────────────────────────────────────

pub fn create_provider(
    conn: &Connection,
    org_settings_id: &str,
    input: &CreateProviderInput,
) -> Result<(ChatbotProvider, SettingsChange), AppError> {
    let org = organization_settings::find(conn, org_settings_id)?;
    // The default provider is set on creation and can be neither cleared nor
    // deleted, so a new provider never changes what a course resolves to.
    let provider = insert_provider(conn, &org.id, input)?;
    Ok((provider, SettingsChange::default()))
}

pub fn update_provider(
    conn: &Connection,
    id: &str,
    input: &UpdateProviderInput,
) -> Result<(ChatbotProvider, SettingsChange), AppError> {
    if let Some(Some(ref url)) = input.base_url {
        require_base_url(url)?;
    }
    if let Some(ref headers) = input.headers {
        require_header_names(headers)?;
    }

    let current = providers::find(conn, id)?;
    let org = organization_settings::find(conn, &current.org_settings_id)?;
    if let Some(Some(ref model_id)) = input.default_model_id {
        require_provider_model(conn, &current, model_id, false)?;
    }
    if let Some(Some(ref model_id)) = input.default_vision_model_id {
        require_provider_model(conn, &current, model_id, true)?;
    }

    let incoming = current.merged_with(input);
    providers::write(conn, id, input)?;

    let entries = cascade::plan_provider_cascade(conn, &org, &current, &incoming)?;
    let mut change = SettingsChange::from(cascade::apply(conn, entries)?);
    if current.projection_differs(&incoming) {
        change.course_settings_ids.extend(rows_on_provider(conn, id)?);
    }

    Ok((providers::find(conn, id)?, change))
}

pub fn delete_provider(conn: &Connection, id: &str) -> Result<SettingsChange, AppError> {
    let provider = providers::find(conn, id)?;
    reassign::guard_provider_delete(conn, &provider)?;
    let org = organization_settings::find(conn, &provider.org_settings_id)?;

    let affected = reassign::reassign_after_provider_removal(conn, &provider, &org)?;
    providers::delete(conn, id)?;

    tracing::info!(provider_id = %id, reassigned = affected.len(), "Deleted provider");
    Ok(SettingsChange {
        course_settings_ids: affected.into_iter().collect(),
        ..Default::default()
    })
}

// ── Models ──────────────────────────────────────────────────────────

/// A new model is not used by any course yet, so nothing is projected.
pub fn create_model(
    conn: &Connection,
    provider_id: &str,
    input: &CreateModelInput,
) -> Result<(ProviderModel, SettingsChange), AppError> {
    providers::find(conn, provider_id)?;
    let model = llm_models::insert(conn, provider_id, input)?;
    Ok((model, SettingsChange::default()))
}

pub fn update_model(
    conn: &Connection,
    id: &str,
    input: &UpdateModelInput,
) -> Result<(ProviderModel, SettingsChange), AppError> {
    let current = llm_models::find(conn, id)?;
    let provider = providers::find(conn, &current.provider_id)?;
    if input.is_vision == Some(false) && provider.default_vision_model_id.as_deref() == Some(id) {
        return Err(AppError::Validation(format!(
            "'{}' is the provider's default vision model and must keep vision support",
            current.model_name
        )));
    }

    let model = llm_models::update(conn, id, input)?;
    let mut change = SettingsChange::default();
    // Only the name reaches the projection, as modelName or a default name
    if model.model_name != current.model_name {
        change.course_settings_ids.extend(rows_on_provider(conn, &provider.id)?);
    }
    Ok((model, change))
}

pub fn delete_model(conn: &Connection, id: &str) -> Result<SettingsChange, AppError> {
    let model = llm_models::find(conn, id)?;
    let provider = providers::find(conn, &model.provider_id)?;
    reassign::guard_model_delete(&provider, &model)?;
    let org = organization_settings::find(conn, &provider.org_settings_id)?;

    let affected = reassign::reassign_after_model_removal(conn, &model, &provider, &org)?;
    llm_models::delete(conn, id)?;

    tracing::info!(model_id = %id, reassigned = affected.len(), "Deleted model");
    Ok(SettingsChange {
        course_settings_ids: affected.into_iter().collect(),
        ..Default::default()
    })
}

// ── Course settings ─────────────────────────────────────────────────

/// Create or update a course's settings.
///
/// A value passed without its flag becomes an override. A flag set to true
/// resets the field to the resolved default. Every flagged field is re-synced
/// to the current default before the write.
pub fn upsert_course_settings(
    conn: &Connection,
    course_id: i64,
    input: &UpsertCourseSettingsInput,
) -> Result<(CourseSettings, SettingsChange), AppError> {
    let course = courses::find(conn, course_id)?;
    let org = organization_settings::find_for_organization(conn, course.organization_id)?
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Organization {} has no chatbot settings",
                course.organization_id
            ))
        })?;

    validate_values(
        input.prompt.as_deref(),
        input.temperature,
        input.top_k,
        input.similarity_threshold_documents,
        input.similarity_threshold_questions,
    )?;
    if let Some(ref llm_id) = input.llm_id {
        require_valid_id("llm_id", llm_id)?;
        let model = llm_models::find(conn, llm_id)?;
        let provider = providers::find(conn, &model.provider_id)?;
        if provider.org_settings_id != org.id {
            return Err(AppError::Validation(format!(
                "Model '{}' does not belong to this organization",
                model.model_name
            )));
        }
    }

    let default_provider = load_default_provider(conn, &org)?;
    let defaults = resolve_defaults(&org, default_provider.as_ref());

    let existing = course_repo::find_for_course(conn, course_id)?;
    let is_new = existing.is_none();
    let mut row = existing.unwrap_or_else(|| inheriting_row(course_id, &org.id, &defaults));

    for field in SettingsField::ALL {
        match (input.default_flag(field), input.explicit_value(field)) {
            (Some(true), _) => row.set_uses_default(field, true),
            (Some(false), value) => {
                row.set_uses_default(field, false);
                if value.is_some() {
                    row.set_value(field, value);
                }
            }
            (None, Some(value)) => {
                row.set_uses_default(field, false);
                row.set_value(field, Some(value));
            }
            (None, None) => {}
        }
        if row.uses_default(field) {
            row.set_value(field, defaults.get(field));
        }
    }

    if is_new {
        course_repo::insert(conn, &row)?;
        tracing::debug!(course_id, course_settings_id = %row.id, "Created course settings");
    } else {
        course_repo::write(conn, &row)?;
    }

    let saved = course_repo::find(conn, &row.id)?;
    let change = SettingsChange {
        course_settings_ids: BTreeSet::from([saved.id.clone()]),
        ..Default::default()
    };
    Ok((saved, change))
}

/// Delete a course. Its settings row cascades and its projection is removed.
pub fn delete_course(conn: &Connection, course_id: i64) -> Result<SettingsChange, AppError> {
    courses::find(conn, course_id)?;
    let had_settings = course_repo::find_for_course(conn, course_id)?.is_some();
    courses::delete(conn, course_id)?;

    let mut change = SettingsChange::default();
    if had_settings {
        change.removed_course_ids.insert(course_id);
    }
    Ok(change)
}
