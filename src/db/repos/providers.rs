use rusqlite::{params, Connection, Row};
use std::collections::HashMap;

use crate::db::models::{ChatbotProvider, UpdateProviderInput};
use crate::db::DbPool;
use crate::error::AppError;

fn row_to_provider(row: &Row) -> rusqlite::Result<ChatbotProvider> {
    let raw_headers: String = row.get("headers")?;
    let headers: HashMap<String, String> = serde_json::from_str(&raw_headers).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Unparseable provider headers, treating as empty");
        HashMap::new()
    });
    Ok(ChatbotProvider {
        id: row.get("id")?,
        org_settings_id: row.get("org_settings_id")?,
        provider_type: row.get("provider_type")?,
        nickname: row.get("nickname")?,
        base_url: row.get("base_url")?,
        headers,
        api_key: row.get("api_key")?,
        default_model_id: row.get("default_model_id")?,
        default_vision_model_id: row.get("default_vision_model_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find(conn: &Connection, id: &str) -> Result<ChatbotProvider, AppError> {
    conn.query_row(
        "SELECT * FROM chatbot_providers WHERE id = ?1",
        params![id],
        row_to_provider,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Provider {id}")),
        other => AppError::Database(other),
    })
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<ChatbotProvider, AppError> {
    let conn = pool.get()?;
    find(&conn, id)
}

pub fn list_for_org_settings(
    conn: &Connection,
    org_settings_id: &str,
) -> Result<Vec<ChatbotProvider>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM chatbot_providers WHERE org_settings_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(params![org_settings_id], row_to_provider)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn count_for_org_settings(conn: &Connection, org_settings_id: &str) -> Result<i64, AppError> {
    conn.query_row(
        "SELECT COUNT(*) FROM chatbot_providers WHERE org_settings_id = ?1",
        params![org_settings_id],
        |row| row.get(0),
    )
    .map_err(AppError::Database)
}

/// Insert a provider without default model pointers; models are created next.
#[allow(clippy::too_many_arguments)]
pub fn insert(
    conn: &Connection,
    org_settings_id: &str,
    provider_type: &str,
    nickname: Option<&str>,
    base_url: Option<&str>,
    headers: &HashMap<String, String>,
    api_key: Option<&str>,
) -> Result<ChatbotProvider, AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let headers_json = serde_json::to_string(headers)?;
    conn.execute(
        "INSERT INTO chatbot_providers
         (id, org_settings_id, provider_type, nickname, base_url, headers, api_key,
          default_model_id, default_vision_model_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL, ?8, ?8)",
        params![id, org_settings_id, provider_type, nickname, base_url, headers_json, api_key, now],
    )?;
    find(conn, &id)
}

pub fn write(conn: &Connection, id: &str, input: &UpdateProviderInput) -> Result<(), AppError> {
    let now = chrono::Utc::now().to_rfc3339();
    let headers_json = input.headers.as_ref().map(serde_json::to_string).transpose()?;

    let mut sets: Vec<String> = vec!["updated_at = ?1".into()];
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(now)];
    let mut param_idx = 2u32;

    push_field!(input.nickname, "nickname", sets, values, param_idx);
    push_field!(input.base_url, "base_url", sets, values, param_idx);
    push_field!(headers_json, "headers", sets, values, param_idx);
    push_field!(input.api_key, "api_key", sets, values, param_idx);
    push_field!(input.default_model_id, "default_model_id", sets, values, param_idx);
    push_field!(input.default_vision_model_id, "default_vision_model_id", sets, values, param_idx);

    let sql = format!(
        "UPDATE chatbot_providers SET {} WHERE id = ?{}",
        sets.join(", "),
        param_idx
    );
    values.push(Box::new(id.to_string()));

    let params_ref: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let rows = conn.execute(&sql, params_ref.as_slice())?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Provider {id}")));
    }
    Ok(())
}

/// Deletes the provider and, by cascade, its models.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, AppError> {
    conn.execute(
        "UPDATE chatbot_providers SET default_model_id = NULL, default_vision_model_id = NULL
         WHERE id = ?1",
        params![id],
    )?;
    let rows = conn.execute("DELETE FROM chatbot_providers WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::repos::{organization_settings, organizations};

    #[test]
    fn test_crud_provider() {
        let pool = init_test_db().unwrap();
        let org = organizations::create(&pool, "Org").unwrap();
        let conn = pool.get().unwrap();
        let settings =
            organization_settings::insert(&conn, org.id, None, None, None, None, None).unwrap();

        let mut headers = HashMap::new();
        headers.insert("X-Tenant".to_string(), "cs".to_string());
        let provider = insert(
            &conn,
            &settings.id,
            "ollama",
            Some("Local"),
            Some("http://localhost:11434"),
            &headers,
            None,
        )
        .unwrap();
        assert_eq!(provider.headers.get("X-Tenant").map(String::as_str), Some("cs"));
        assert_eq!(count_for_org_settings(&conn, &settings.id).unwrap(), 1);

        write(
            &conn,
            &provider.id,
            &UpdateProviderInput {
                nickname: Some(None),
                headers: Some(HashMap::new()),
                ..Default::default()
            },
        )
        .unwrap();
        let fetched = find(&conn, &provider.id).unwrap();
        assert_eq!(fetched.nickname, None);
        assert!(fetched.headers.is_empty());
        assert_eq!(fetched.base_url.as_deref(), Some("http://localhost:11434"));

        assert!(delete(&conn, &provider.id).unwrap());
        assert!(list_for_org_settings(&conn, &settings.id).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_unknown_provider_type() {
        let pool = init_test_db().unwrap();
        let org = organizations::create(&pool, "Org").unwrap();
        let conn = pool.get().unwrap();
        let settings =
            organization_settings::insert(&conn, org.id, None, None, None, None, None).unwrap();

        let result = insert(&conn, &settings.id, "mystery", None, None, &HashMap::new(), None);
        assert!(matches!(result, Err(AppError::Database(_))));
    }
}
