use rusqlite::{params, OptionalExtension};

use crate::chatbot::types::CourseSettingsMetadata;
use crate::db::DbPool;
use crate::error::AppError;

/// Direct access to the chatbot service's `course_setting` table.
///
/// Reads decide whether a projection changed. Writes are the fallback path
/// used only while the service's API is unreachable.
#[derive(Clone)]
pub struct ReplicaStore {
    pool: DbPool,
}

impl ReplicaStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Stored metadata for a course, if the service has a row for it.
    pub fn get(&self, course_id: i64) -> Result<Option<serde_json::Value>, AppError> {
        let conn = self.pool.get()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT metadata FROM course_setting WHERE page_content = ?1",
                params![course_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn insert(
        &self,
        course_id: i64,
        metadata: &CourseSettingsMetadata,
    ) -> Result<(), AppError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO course_setting (id, page_content, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, course_id.to_string(), serde_json::to_string(metadata)?, now],
        )?;
        Ok(())
    }

    /// Returns the number of rows written (0 if the row disappeared meanwhile).
    pub fn update(
        &self,
        course_id: i64,
        metadata: &CourseSettingsMetadata,
    ) -> Result<usize, AppError> {
        let conn = self.pool.get()?;
        let now = chrono::Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE course_setting SET metadata = ?1, updated_at = ?2 WHERE page_content = ?3",
            params![serde_json::to_string(metadata)?, now, course_id.to_string()],
        )?;
        Ok(rows)
    }

    pub fn delete(&self, course_id: i64) -> Result<bool, AppError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM course_setting WHERE page_content = ?1",
            params![course_id.to_string()],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbot::types::OrganizationDescriptor;
    use crate::db::init_test_replica_db;

    fn metadata(temperature: f64) -> CourseSettingsMetadata {
        CourseSettingsMetadata {
            organization_settings: OrganizationDescriptor {
                id: "os".into(),
                organization_id: 1,
                default_provider_id: None,
            },
            model: None,
            prompt: "p".into(),
            temperature,
            top_k: 5,
            similarity_threshold_documents: 0.55,
            similarity_threshold_questions: 0.9,
        }
    }

    #[test]
    fn test_keyed_by_course_id_string() {
        let store = ReplicaStore::new(init_test_replica_db().unwrap());
        assert!(store.get(4).unwrap().is_none());

        store.insert(4, &metadata(0.1)).unwrap();
        let stored = store.get(4).unwrap().unwrap();
        assert_eq!(stored, metadata(0.1).to_stored_value().unwrap());

        assert_eq!(store.update(4, &metadata(0.2)).unwrap(), 1);
        assert_eq!(store.get(4).unwrap().unwrap()["temperature"], 0.2);
        assert_eq!(store.update(5, &metadata(0.2)).unwrap(), 0);

        assert!(store.delete(4).unwrap());
        assert!(!store.delete(4).unwrap());
    }
}
