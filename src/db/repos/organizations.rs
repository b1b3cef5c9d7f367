use rusqlite::{params, Connection, Row};

use crate::db::models::Organization;
use crate::db::DbPool;
use crate::error::AppError;
use crate::validation::require_non_empty;

fn row_to_organization(row: &Row) -> rusqlite::Result<Organization> {
    Ok(Organization {
        id: row.get("id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}

pub fn find(conn: &Connection, id: i64) -> Result<Organization, AppError> {
    conn.query_row(
        "SELECT * FROM organizations WHERE id = ?1",
        params![id],
        row_to_organization,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Organization {id}")),
        other => AppError::Database(other),
    })
}

pub fn get_by_id(pool: &DbPool, id: i64) -> Result<Organization, AppError> {
    let conn = pool.get()?;
    find(&conn, id)
}

pub fn create(pool: &DbPool, name: &str) -> Result<Organization, AppError> {
    require_non_empty("name", name)?;
    let now = chrono::Utc::now().to_rfc3339();
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO organizations (name, created_at) VALUES (?1, ?2)",
        params![name, now],
    )?;
    let id = conn.last_insert_rowid();
    find(&conn, id)
}
