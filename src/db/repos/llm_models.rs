use rusqlite::{params, Connection, Row};

use crate::db::models::{CreateModelInput, ProviderModel, UpdateModelInput};
use crate::db::DbPool;
use crate::error::AppError;
use crate::validation::require_non_empty;

fn row_to_model(row: &Row) -> rusqlite::Result<ProviderModel> {
    Ok(ProviderModel {
        id: row.get("id")?,
        provider_id: row.get("provider_id")?,
        model_name: row.get("model_name")?,
        is_text: row.get::<_, i32>("is_text")? != 0,
        is_vision: row.get::<_, i32>("is_vision")? != 0,
        is_thinking: row.get::<_, i32>("is_thinking")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

pub fn find(conn: &Connection, id: &str) -> Result<ProviderModel, AppError> {
    conn.query_row("SELECT * FROM provider_models WHERE id = ?1", params![id], row_to_model)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Model {id}")),
            other => AppError::Database(other),
        })
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<ProviderModel, AppError> {
    let conn = pool.get()?;
    find(&conn, id)
}

pub fn list_for_provider(
    conn: &Connection,
    provider_id: &str,
) -> Result<Vec<ProviderModel>, AppError> {
    let mut stmt =
        conn.prepare("SELECT * FROM provider_models WHERE provider_id = ?1 ORDER BY model_name")?;
    let rows = stmt.query_map(params![provider_id], row_to_model)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn ids_for_provider(conn: &Connection, provider_id: &str) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare("SELECT id FROM provider_models WHERE provider_id = ?1")?;
    let rows = stmt.query_map(params![provider_id], |row| row.get::<_, String>(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn insert(
    conn: &Connection,
    provider_id: &str,
    input: &CreateModelInput,
) -> Result<ProviderModel, AppError> {
    require_non_empty("model_name", &input.model_name)?;
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO provider_models
         (id, provider_id, model_name, is_text, is_vision, is_thinking, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id,
            provider_id,
            input.model_name.trim(),
            input.is_text.unwrap_or(true) as i32,
            input.is_vision.unwrap_or(false) as i32,
            input.is_thinking.unwrap_or(false) as i32,
            now,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Validation(format!(
                "Model '{}' already exists on this provider",
                input.model_name.trim()
            ))
        } else {
            AppError::Database(e)
        }
    })?;
    find(conn, &id)
}

pub fn update(
    conn: &Connection,
    id: &str,
    input: &UpdateModelInput,
) -> Result<ProviderModel, AppError> {
    if let Some(ref name) = input.model_name {
        require_non_empty("model_name", name)?;
    }
    let now = chrono::Utc::now().to_rfc3339();
    let model_name = input.model_name.as_ref().map(|n| n.trim().to_string());

    let mut sets: Vec<String> = vec!["updated_at = ?1".into()];
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(now)];
    let mut param_idx = 2u32;

    push_field!(model_name, "model_name", sets, values, param_idx);
    push_field!(input.is_text, "is_text", sets, values, param_idx);
    push_field!(input.is_vision, "is_vision", sets, values, param_idx);
    push_field!(input.is_thinking, "is_thinking", sets, values, param_idx);

    let sql = format!(
        "UPDATE provider_models SET {} WHERE id = ?{}",
        sets.join(", "),
        param_idx
    );
    values.push(Box::new(id.to_string()));

    let params_ref: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let rows = conn.execute(&sql, params_ref.as_slice())?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Model {id}")));
    }
    find(conn, id)
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool, AppError> {
    let rows = conn.execute("DELETE FROM provider_models WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::repos::{organization_settings, organizations, providers};
    use std::collections::HashMap;

    #[test]
    fn test_crud_model() {
        let pool = init_test_db().unwrap();
        let org = organizations::create(&pool, "Org").unwrap();
        let conn = pool.get().unwrap();
        let settings =
            organization_settings::insert(&conn, org.id, None, None, None, None, None).unwrap();
        let provider =
            providers::insert(&conn, &settings.id, "openai", None, None, &HashMap::new(), None)
                .unwrap();

        let model = insert(
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
        assert!(model.is_text);
        assert!(model.is_vision);
        assert!(!model.is_thinking);

        let dup = insert(&conn, &provider.id, &CreateModelInput::named("gpt-4o"));
        assert!(matches!(dup, Err(AppError::Validation(_))));

        let updated = update(
            &conn,
            &model.id,
            &UpdateModelInput {
                is_thinking: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(updated.is_thinking);
        assert_eq!(updated.model_name, "gpt-4o");

        assert_eq!(ids_for_provider(&conn, &provider.id).unwrap(), vec![model.id.clone()]);
        assert!(delete(&conn, &model.id).unwrap());
        assert!(list_for_provider(&conn, &provider.id).unwrap().is_empty());
    }
}
