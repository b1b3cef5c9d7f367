use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::placeholders;
use crate::db::models::{CourseSettings, FieldValue, SettingsField};
use crate::db::DbPool;
use crate::error::AppError;

fn row_to_course_settings(row: &Row) -> rusqlite::Result<CourseSettings> {
    Ok(CourseSettings {
        id: row.get("id")?,
        course_id: row.get("course_id")?,
        org_settings_id: row.get("org_settings_id")?,
        llm_id: row.get("llm_id")?,
        prompt: row.get("prompt")?,
        temperature: row.get("temperature")?,
        top_k: row.get("top_k")?,
        similarity_threshold_documents: row.get("similarity_threshold_documents")?,
        similarity_threshold_questions: row.get("similarity_threshold_questions")?,
        using_default_model: row.get::<_, i32>("using_default_model")? != 0,
        using_default_prompt: row.get::<_, i32>("using_default_prompt")? != 0,
        using_default_temperature: row.get::<_, i32>("using_default_temperature")? != 0,
        using_default_top_k: row.get::<_, i32>("using_default_top_k")? != 0,
        using_default_similarity_threshold_documents: row
            .get::<_, i32>("using_default_similarity_threshold_documents")?
            != 0,
        using_default_similarity_threshold_questions: row
            .get::<_, i32>("using_default_similarity_threshold_questions")?
            != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn collect_ids(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn find(conn: &Connection, id: &str) -> Result<CourseSettings, AppError> {
    conn.query_row(
        "SELECT * FROM course_settings WHERE id = ?1",
        params![id],
        row_to_course_settings,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Course settings {id}")),
        other => AppError::Database(other),
    })
}

pub fn find_for_course(
    conn: &Connection,
    course_id: i64,
) -> Result<Option<CourseSettings>, AppError> {
    conn.query_row(
        "SELECT * FROM course_settings WHERE course_id = ?1",
        params![course_id],
        row_to_course_settings,
    )
    .optional()
    .map_err(AppError::Database)
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<CourseSettings, AppError> {
    let conn = pool.get()?;
    find(&conn, id)
}

pub fn get_for_course(pool: &DbPool, course_id: i64) -> Result<Option<CourseSettings>, AppError> {
    let conn = pool.get()?;
    find_for_course(&conn, course_id)
}

pub fn list_for_org_settings(
    conn: &Connection,
    org_settings_id: &str,
) -> Result<Vec<CourseSettings>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM course_settings WHERE org_settings_id = ?1 ORDER BY course_id",
    )?;
    let rows = stmt.query_map(params![org_settings_id], row_to_course_settings)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn list_all_ids(conn: &Connection) -> Result<Vec<String>, AppError> {
    collect_ids(conn, "SELECT id FROM course_settings ORDER BY course_id", &[])
}

pub fn ids_for_org_settings(
    conn: &Connection,
    org_settings_id: &str,
) -> Result<Vec<String>, AppError> {
    collect_ids(
        conn,
        "SELECT id FROM course_settings WHERE org_settings_id = ?1",
        &[&org_settings_id],
    )
}

pub fn course_ids_for_org_settings(
    conn: &Connection,
    org_settings_id: &str,
) -> Result<Vec<i64>, AppError> {
    let mut stmt =
        conn.prepare("SELECT course_id FROM course_settings WHERE org_settings_id = ?1")?;
    let rows = stmt.query_map(params![org_settings_id], |row| row.get::<_, i64>(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

/// Rows of an organization whose `using_default_*` flag for `field` is set.
pub fn ids_using_default(
    conn: &Connection,
    org_settings_id: &str,
    field: SettingsField,
) -> Result<Vec<String>, AppError> {
    let sql = format!(
        "SELECT id FROM course_settings WHERE org_settings_id = ?1 AND {} = 1",
        field.flag_column()
    );
    collect_ids(conn, &sql, &[&org_settings_id])
}

/// Rows whose `llm_id` is one of `model_ids`.
pub fn ids_with_llm_in(conn: &Connection, model_ids: &[String]) -> Result<Vec<String>, AppError> {
    if model_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id FROM course_settings WHERE llm_id IN ({})",
        placeholders(1, model_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(model_ids.iter()), |row| row.get::<_, String>(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn insert(conn: &Connection, settings: &CourseSettings) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO course_settings
         (id, course_id, org_settings_id, llm_id, prompt, temperature, top_k,
          similarity_threshold_documents, similarity_threshold_questions,
          using_default_model, using_default_prompt, using_default_temperature,
          using_default_top_k, using_default_similarity_threshold_documents,
          using_default_similarity_threshold_questions, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            settings.id,
            settings.course_id,
            settings.org_settings_id,
            settings.llm_id,
            settings.prompt,
            settings.temperature,
            settings.top_k,
            settings.similarity_threshold_documents,
            settings.similarity_threshold_questions,
            settings.using_default_model as i32,
            settings.using_default_prompt as i32,
            settings.using_default_temperature as i32,
            settings.using_default_top_k as i32,
            settings.using_default_similarity_threshold_documents as i32,
            settings.using_default_similarity_threshold_questions as i32,
            settings.created_at,
            settings.updated_at,
        ],
    )?;
    Ok(())
}

/// Overwrite every value and flag column of an existing row.
pub fn write(conn: &Connection, settings: &CourseSettings) -> Result<(), AppError> {
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE course_settings SET
             llm_id = ?1, prompt = ?2, temperature = ?3, top_k = ?4,
             similarity_threshold_documents = ?5, similarity_threshold_questions = ?6,
             using_default_model = ?7, using_default_prompt = ?8,
             using_default_temperature = ?9, using_default_top_k = ?10,
             using_default_similarity_threshold_documents = ?11,
             using_default_similarity_threshold_questions = ?12,
             updated_at = ?13
         WHERE id = ?14",
        params![
            settings.llm_id,
            settings.prompt,
            settings.temperature,
            settings.top_k,
            settings.similarity_threshold_documents,
            settings.similarity_threshold_questions,
            settings.using_default_model as i32,
            settings.using_default_prompt as i32,
            settings.using_default_temperature as i32,
            settings.using_default_top_k as i32,
            settings.using_default_similarity_threshold_documents as i32,
            settings.using_default_similarity_threshold_questions as i32,
            now,
            settings.id,
        ],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Course settings {}", settings.id)));
    }
    Ok(())
}

/// One `UPDATE ... WHERE id IN (...)` setting the same values on every row in `ids`.
pub fn bulk_update(
    conn: &Connection,
    ids: &[String],
    values: &[(SettingsField, FieldValue)],
) -> Result<usize, AppError> {
    if ids.is_empty() || values.is_empty() {
        return Ok(0);
    }
    let now = chrono::Utc::now().to_rfc3339();

    let mut sets: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, (field, _))| format!("{} = ?{}", field.column(), i + 1))
        .collect();
    sets.push(format!("updated_at = ?{}", values.len() + 1));

    let sql = format!(
        "UPDATE course_settings SET {} WHERE id IN ({})",
        sets.join(", "),
        placeholders(values.len() + 2, ids.len())
    );

    let mut bound: Vec<&dyn rusqlite::types::ToSql> = values
        .iter()
        .map(|(_, v)| v as &dyn rusqlite::types::ToSql)
        .collect();
    bound.push(&now);
    bound.extend(ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));

    let rows = conn.execute(&sql, bound.as_slice())?;
    Ok(rows)
}

/// Point `ids` at `llm_id` and set their `using_default_model` flag.
pub fn set_model(
    conn: &Connection,
    ids: &[String],
    llm_id: Option<&str>,
    using_default: bool,
) -> Result<usize, AppError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let now = chrono::Utc::now().to_rfc3339();
    let sql = format!(
        "UPDATE course_settings SET llm_id = ?1, using_default_model = ?2, updated_at = ?3
         WHERE id IN ({})",
        placeholders(4, ids.len())
    );
    let flag = using_default as i32;
    let mut bound: Vec<&dyn rusqlite::types::ToSql> = vec![&llm_id, &flag, &now];
    bound.extend(ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));
    let rows = conn.execute(&sql, bound.as_slice())?;
    Ok(rows)
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool, AppError> {
    let rows = conn.execute("DELETE FROM course_settings WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::repos::{courses, organization_settings, organizations};

    fn sample(course_id: i64, org_settings_id: &str) -> CourseSettings {
        let now = chrono::Utc::now().to_rfc3339();
        CourseSettings {
            id: uuid::Uuid::new_v4().to_string(),
            course_id,
            org_settings_id: org_settings_id.to_string(),
            llm_id: None,
            prompt: "Help students.".into(),
            temperature: 0.7,
            top_k: 5,
            similarity_threshold_documents: 0.55,
            similarity_threshold_questions: 0.9,
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

    #[test]
    fn test_insert_bulk_update_and_flags() {
        let pool = init_test_db().unwrap();
        let org = organizations::create(&pool, "Org").unwrap();
        let c1 = courses::create(&pool, org.id, "CS 101").unwrap();
        let c2 = courses::create(&pool, org.id, "CS 102").unwrap();
        let conn = pool.get().unwrap();
        let settings =
            organization_settings::insert(&conn, org.id, None, None, None, None, None).unwrap();

        let first = sample(c1.id, &settings.id);
        let mut second = sample(c2.id, &settings.id);
        second.using_default_temperature = false;
        second.temperature = 0.2;
        insert(&conn, &first).unwrap();
        insert(&conn, &second).unwrap();

        let inheriting =
            ids_using_default(&conn, &settings.id, SettingsField::Temperature).unwrap();
        assert_eq!(inheriting, vec![first.id.clone()]);

        let updated = bulk_update(
            &conn,
            &inheriting,
            &[
                (SettingsField::Temperature, FieldValue::Real(0.4)),
                (SettingsField::TopK, FieldValue::Integer(9)),
            ],
        )
        .unwrap();
        assert_eq!(updated, 1);

        let a = find(&conn, &first.id).unwrap();
        assert_eq!(a.temperature, 0.4);
        assert_eq!(a.top_k, 9);
        let b = find(&conn, &second.id).unwrap();
        assert_eq!(b.temperature, 0.2);
        assert_eq!(b.top_k, 5);

        assert_eq!(find_for_course(&conn, c2.id).unwrap().unwrap().id, second.id);
        assert_eq!(course_ids_for_org_settings(&conn, &settings.id).unwrap().len(), 2);
    }

    #[test]
    fn test_course_delete_cascades() {
        let pool = init_test_db().unwrap();
        let org = organizations::create(&pool, "Org").unwrap();
        let course = courses::create(&pool, org.id, "CS 101").unwrap();
        let conn = pool.get().unwrap();
        let settings =
            organization_settings::insert(&conn, org.id, None, None, None, None, None).unwrap();
        let row = sample(course.id, &settings.id);
        insert(&conn, &row).unwrap();

        assert!(courses::delete(&conn, course.id).unwrap());
        assert!(find_for_course(&conn, course.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_removes_only_that_row() {
        let pool = init_test_db().unwrap();
        let org = organizations::create(&pool, "Org").unwrap();
        let c1 = courses::create(&pool, org.id, "CS 101").unwrap();
        let c2 = courses::create(&pool, org.id, "CS 102").unwrap();
        let conn = pool.get().unwrap();
        let settings =
            organization_settings::insert(&conn, org.id, None, None, None, None, None).unwrap();
        let gone = sample(c1.id, &settings.id);
        let kept = sample(c2.id, &settings.id);
        insert(&conn, &gone).unwrap();
        insert(&conn, &kept).unwrap();

        assert!(delete(&conn, &gone.id).unwrap());
        assert!(!delete(&conn, &gone.id).unwrap());
        assert!(find_for_course(&conn, c1.id).unwrap().is_none());
        assert_eq!(list_all_ids(&conn).unwrap(), vec![kept.id]);
    }

    #[test]
    fn test_empty_id_lists_are_noops() {
        let pool = init_test_db().unwrap();
        let conn = pool.get().unwrap();
        let top_k = [(SettingsField::TopK, FieldValue::Integer(1))];
        assert_eq!(bulk_update(&conn, &[], &top_k).unwrap(), 0);
        assert_eq!(set_model(&conn, &[], None, true).unwrap(), 0);
        assert!(ids_with_llm_in(&conn, &[]).unwrap().is_empty());
    }
}
