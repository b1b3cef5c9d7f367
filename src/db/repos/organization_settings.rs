use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{OrganizationSettings, UpdateOrganizationSettingsInput};
use crate::db::DbPool;
use crate::error::AppError;

fn row_to_org_settings(row: &Row) -> rusqlite::Result<OrganizationSettings> {
    Ok(OrganizationSettings {
        id: row.get("id")?,
        organization_id: row.get("organization_id")?,
        default_provider_id: row.get("default_provider_id")?,
        default_prompt: row.get("default_prompt")?,
        default_temperature: row.get("default_temperature")?,
        default_top_k: row.get("default_top_k")?,
        default_similarity_threshold_documents: row.get("default_similarity_threshold_documents")?,
        default_similarity_threshold_questions: row.get("default_similarity_threshold_questions")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find(conn: &Connection, id: &str) -> Result<OrganizationSettings, AppError> {
    conn.query_row(
        "SELECT * FROM organization_settings WHERE id = ?1",
        params![id],
        row_to_org_settings,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::NotFound(format!("Organization settings {id}"))
        }
        other => AppError::Database(other),
    })
}

pub fn find_for_organization(
    conn: &Connection,
    organization_id: i64,
) -> Result<Option<OrganizationSettings>, AppError> {
    conn.query_row(
        "SELECT * FROM organization_settings WHERE organization_id = ?1",
        params![organization_id],
        row_to_org_settings,
    )
    .optional()
    .map_err(AppError::Database)
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<OrganizationSettings, AppError> {
    let conn = pool.get()?;
    find(&conn, id)
}

pub fn get_for_organization(
    pool: &DbPool,
    organization_id: i64,
) -> Result<Option<OrganizationSettings>, AppError> {
    let conn = pool.get()?;
    find_for_organization(&conn, organization_id)
}

/// Insert a settings row without a default provider. The caller sets one
/// once the first provider exists.
pub fn insert(
    conn: &Connection,
    organization_id: i64,
    default_prompt: Option<&str>,
    default_temperature: Option<f64>,
    default_top_k: Option<i64>,
    default_similarity_threshold_documents: Option<f64>,
    default_similarity_threshold_questions: Option<f64>,
) -> Result<OrganizationSettings, AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO organization_settings
         (id, organization_id, default_provider_id, default_prompt, default_temperature,
          default_top_k, default_similarity_threshold_documents,
          default_similarity_threshold_questions, created_at, updated_at)
         VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            id,
            organization_id,
            default_prompt,
            default_temperature,
            default_top_k,
            default_similarity_threshold_documents,
            default_similarity_threshold_questions,
            now,
        ],
    )?;
    find(conn, &id)
}

/// Apply a partial update. Only columns present in `input` are written.
pub fn write(
    conn: &Connection,
    id: &str,
    input: &UpdateOrganizationSettingsInput,
) -> Result<(), AppError> {
    let now = chrono::Utc::now().to_rfc3339();

    let mut sets: Vec<String> = vec!["updated_at = ?1".into()];
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(now)];
    let mut param_idx = 2u32;

    push_field!(input.default_provider_id, "default_provider_id", sets, values, param_idx);
    push_field!(input.default_prompt, "default_prompt", sets, values, param_idx);
    push_field!(input.default_temperature, "default_temperature", sets, values, param_idx);
    push_field!(input.default_top_k, "default_top_k", sets, values, param_idx);
    push_field!(
        input.default_similarity_threshold_documents,
        "default_similarity_threshold_documents",
        sets,
        values,
        param_idx
    );
    push_field!(
        input.default_similarity_threshold_questions,
        "default_similarity_threshold_questions",
        sets,
        values,
        param_idx
    );

    let sql = format!(
        "UPDATE organization_settings SET {} WHERE id = ?{}",
        sets.join(", "),
        param_idx
    );
    values.push(Box::new(id.to_string()));

    let params_ref: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let rows = conn.execute(&sql, params_ref.as_slice())?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Organization settings {id}")));
    }
    Ok(())
}

/// Ids of every organization settings row that points at `provider_id` as its default.
pub fn ids_defaulting_to_provider(
    conn: &Connection,
    provider_id: &str,
) -> Result<Vec<String>, AppError> {
    let mut stmt =
        conn.prepare("SELECT id FROM organization_settings WHERE default_provider_id = ?1")?;
    let rows = stmt.query_map(params![provider_id], |row| row.get::<_, String>(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

/// Deletes the row; providers, models and course settings cascade.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, AppError> {
    // Break the settings -> provider pointer first so the cascade does not
    // trip over a dangling default_provider_id mid-statement.
    conn.execute(
        "UPDATE organization_settings SET default_provider_id = NULL WHERE id = ?1",
        params![id],
    )?;
    conn.execute(
        "UPDATE chatbot_providers SET default_model_id = NULL, default_vision_model_id = NULL
         WHERE org_settings_id = ?1",
        params![id],
    )?;
    let rows = conn.execute("DELETE FROM organization_settings WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::repos::organizations;

    #[test]
    fn test_insert_write_find() {
        let pool = init_test_db().unwrap();
        let org = organizations::create(&pool, "Org").unwrap();
        let conn = pool.get().unwrap();

        let settings = insert(&conn, org.id, None, Some(0.7), None, None, None).unwrap();
        assert_eq!(settings.default_temperature, Some(0.7));
        assert_eq!(settings.default_provider_id, None);

        write(
            &conn,
            &settings.id,
            &UpdateOrganizationSettingsInput {
                default_temperature: Some(None),
                default_top_k: Some(Some(8)),
                ..Default::default()
            },
        )
        .unwrap();

        let fetched = find_for_organization(&conn, org.id).unwrap().unwrap();
        assert_eq!(fetched.default_temperature, None);
        assert_eq!(fetched.default_top_k, Some(8));

        assert!(find_for_organization(&conn, org.id + 1).unwrap().is_none());
        assert_eq!(
            get_for_organization(&pool, org.id).unwrap().map(|s| s.id),
            Some(settings.id.clone())
        );
        assert!(matches!(find(&conn, "missing"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_write_missing_row() {
        let pool = init_test_db().unwrap();
        let conn = pool.get().unwrap();
        let result = write(&conn, "missing", &UpdateOrganizationSettingsInput::default());
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
