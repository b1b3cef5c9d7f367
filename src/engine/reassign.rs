//! Deletion guards and reassignment of courses that point at removed models.

use rusqlite::Connection;

use crate::db::models::{ChatbotProvider, OrganizationSettings, ProviderModel};
use crate::db::repos::{
    course_settings as course_repo, llm_models, organization_settings, providers,
};
use crate::engine::resolve::resolve_defaults;
use crate::error::AppError;

// ── Guards ──────────────────────────────────────────────────────────

/// Reject deleting a provider that is any organization's default or the last
/// provider of its own organization.
pub fn guard_provider_delete(
    conn: &Connection,
    provider: &ChatbotProvider,
) -> Result<(), AppError> {
    if !organization_settings::ids_defaulting_to_provider(conn, &provider.id)?.is_empty() {
        return Err(AppError::Validation(
            "Cannot delete the organization's default provider; choose another default first"
                .into(),
        ));
    }
    if providers::count_for_org_settings(conn, &provider.org_settings_id)? <= 1 {
        return Err(AppError::Validation(
            "Cannot delete the organization's only provider".into(),
        ));
    }
    Ok(())
}

/// Reject deleting a model its provider names as a default.
pub fn guard_model_delete(
    provider: &ChatbotProvider,
    model: &ProviderModel,
) -> Result<(), AppError> {
    if provider.default_model_id.as_deref() == Some(model.id.as_str()) {
        return Err(AppError::Validation(format!(
            "Cannot delete '{}': it is the provider's default model",
            model.model_name
        )));
    }
    if provider.default_vision_model_id.as_deref() == Some(model.id.as_str()) {
        return Err(AppError::Validation(format!(
            "Cannot delete '{}': it is the provider's default vision model",
            model.model_name
        )));
    }
    Ok(())
}

// ── Reassignment ────────────────────────────────────────────────────

/// Move every course using one of `provider`'s models onto the organization's
/// default model. Must run before the provider row is deleted.
pub fn reassign_after_provider_removal(
    conn: &Connection,
    provider: &ChatbotProvider,
    org: &OrganizationSettings,
) -> Result<Vec<String>, AppError> {
    let model_ids = llm_models::ids_for_provider(conn, &provider.id)?;
    let affected = course_repo::ids_with_llm_in(conn, &model_ids)?;
    if affected.is_empty() {
        return Ok(affected);
    }

    let default_provider = match org.default_provider_id {
        Some(ref id) => Some(providers::find(conn, id)?),
        None => None,
    };
    let target = resolve_defaults(org, default_provider.as_ref()).llm_id;

    let rows = course_repo::set_model(conn, &affected, target.as_deref(), true)?;
    tracing::info!(
        provider_id = %provider.id,
        rows,
        target = ?target,
        "Reassigned courses to the organization default model"
    );
    Ok(affected)
}

/// Move every course using `model` onto its provider's default model. The
/// course keeps inheriting only if that model is also the organization's
/// resolved default.
pub fn reassign_after_model_removal(
    conn: &Connection,
    model: &ProviderModel,
    provider: &ChatbotProvider,
    org: &OrganizationSettings,
) -> Result<Vec<String>, AppError> {
    let affected = course_repo::ids_with_llm_in(conn, std::slice::from_ref(&model.id))?;
    if affected.is_empty() {
        return Ok(affected);
    }

    let default_provider = match org.default_provider_id {
        Some(ref id) if *id == provider.id => Some(provider.clone()),
        Some(ref id) => Some(providers::find(conn, id)?),
        None => None,
    };
    let org_default = resolve_defaults(org, default_provider.as_ref()).llm_id;
    let target = provider.default_model_id.clone();
    let using_default = target.is_some() && target == org_default;

    let rows = course_repo::set_model(conn, &affected, target.as_deref(), using_default)?;
    tracing::info!(
        model_id = %model.id,
        rows,
        target = ?target,
        using_default,
        "Reassigned courses to the provider default model"
    );
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::models::{CreateModelInput, UpdateProviderInput};
    use crate::db::repos::organizations;
    use std::collections::HashMap;

    #[test]
    fn test_model_guard_names_the_pointer() {
        let pool = init_test_db().unwrap();
        let org = organizations::create(&pool, "Org").unwrap();
        let conn = pool.get().unwrap();
        let settings =
            organization_settings::insert(&conn, org.id, None, None, None, None, None).unwrap();
        let provider =
            providers::insert(&conn, &settings.id, "openai", None, None, &HashMap::new(), None)
                .unwrap();
        let text =
            llm_models::insert(&conn, &provider.id, &CreateModelInput::named("gpt-4o-mini"))
                .unwrap();
        let vision = llm_models::insert(
            &conn,
            &provider.id,
            &CreateModelInput {
                model_name: "gpt-4o".into(),
                is_text: None,
                is_vision: Some(true),
                is_thinking: None,
            },
        )
        .unwrap();
        let spare =
            llm_models::insert(&conn, &provider.id, &CreateModelInput::named("o3")).unwrap();
        providers::write(
            &conn,
            &provider.id,
            &UpdateProviderInput {
                default_model_id: Some(Some(text.id.clone())),
                default_vision_model_id: Some(Some(vision.id.clone())),
                ..Default::default()
            },
        )
        .unwrap();
        let provider = providers::find(&conn, &provider.id).unwrap();

        let err = guard_model_delete(&provider, &text).unwrap_err();
        assert!(err.to_string().contains("default model"));
        let err = guard_model_delete(&provider, &vision).unwrap_err();
        assert!(err.to_string().contains("default vision model"));
        assert!(guard_model_delete(&provider, &spare).is_ok());
    }

    #[test]
    fn test_provider_guard_rejects_last_provider() {
        let pool = init_test_db().unwrap();
        let org = organizations::create(&pool, "Org").unwrap();
        let conn = pool.get().unwrap();
        let settings =
            organization_settings::insert(&conn, org.id, None, None, None, None, None).unwrap();
        let only =
            providers::insert(&conn, &settings.id, "ollama", None, None, &HashMap::new(), None)
                .unwrap();

        let err = guard_provider_delete(&conn, &only).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("only provider"));

        let second =
            providers::insert(&conn, &settings.id, "anthropic", None, None, &HashMap::new(), None)
                .unwrap();
        assert!(guard_provider_delete(&conn, &second).is_ok());
    }
}
