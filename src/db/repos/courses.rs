use rusqlite::{params, Connection, Row};

use crate::db::models::Course;
use crate::db::DbPool;
use crate::error::AppError;
use crate::validation::require_non_empty;

fn row_to_course(row: &Row) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get("id")?,
        organization_id: row.get("organization_id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}

pub fn find(conn: &Connection, id: i64) -> Result<Course, AppError> {
    conn.query_row("SELECT * FROM courses WHERE id = ?1", params![id], row_to_course)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Course {id}")),
            other => AppError::Database(other),
        })
}

pub fn get_by_id(pool: &DbPool, id: i64) -> Result<Course, AppError> {
    let conn = pool.get()?;
    find(&conn, id)
}

pub fn list_for_organization(
    conn: &Connection,
    organization_id: i64,
) -> Result<Vec<Course>, AppError> {
    let mut stmt = conn.prepare("SELECT * FROM courses WHERE organization_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![organization_id], row_to_course)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn create(pool: &DbPool, organization_id: i64, name: &str) -> Result<Course, AppError> {
    require_non_empty("name", name)?;
    let now = chrono::Utc::now().to_rfc3339();
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO courses (organization_id, name, created_at) VALUES (?1, ?2, ?3)",
        params![organization_id, name, now],
    )?;
    let id = conn.last_insert_rowid();
    find(&conn, id)
}

/// Deletes the course; its `course_settings` row goes with it via FK cascade.
pub fn delete(conn: &Connection, id: i64) -> Result<bool, AppError> {
    let rows = conn.execute("DELETE FROM courses WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}
