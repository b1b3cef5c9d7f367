pub mod cascade;
pub mod changes;
pub mod projection;
pub mod reassign;
pub mod resolve;

use std::sync::Arc;

use rusqlite::{Connection, TransactionBehavior};

use crate::chatbot::{ChatbotSettingsApi, ReplicaStore};
use crate::db::models::{
    ChatbotProvider, CourseSettings, CreateModelInput, CreateOrganizationSettingsInput,
    CreateProviderInput, OrganizationSettings, ProviderModel, UpdateModelInput,
    UpdateOrganizationSettingsInput, UpdateProviderInput, UpsertCourseSettingsInput,
};
use crate::db::repos::{course_settings as course_repo, organization_settings, providers};
use crate::db::DbPool;
use crate::error::AppError;

pub use self::changes::SettingsChange;
pub use self::projection::{ProjectionReport, ProjectionSync};
use self::resolve::{resolve_defaults, resolve_effective, EffectiveConfig};

/// Result of a committed settings write and its projection pass.
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub value: T,
    pub change: SettingsChange,
    pub projection: ProjectionReport,
}

/// Entry point for every settings write.
///
/// Each write runs in two phases: the primary-store transaction (write plus
/// cascade), then, after commit, the projection of every affected course into
/// the chatbot service. Projection failures are logged and reported in
/// `Applied::projection`; they never fail the write.
pub struct SettingsEngine {
    pool: DbPool,
    projector: ProjectionSync,
}

impl SettingsEngine {
    pub fn new(pool: DbPool, api: Arc<dyn ChatbotSettingsApi>, replica: ReplicaStore) -> Self {
        let projector = ProjectionSync::new(pool.clone(), api, replica);
        Self { pool, projector }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Run `f` in an IMMEDIATE transaction. The write lock is taken before
    /// the first read, so the state `f` loads cannot change underneath it.
    fn in_tx<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Connection) -> Result<T, AppError>,
    {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    async fn apply<T, F>(&self, op: &'static str, f: F) -> Result<Applied<T>, AppError>
    where
        F: FnOnce(&Connection) -> Result<(T, SettingsChange), AppError>,
    {
        let (value, change) = self.in_tx(f)?;
        tracing::debug!(
            op,
            project = change.course_settings_ids.len(),
            remove = change.removed_course_ids.len(),
            cascaded = change.cascade.rows_updated,
            "Settings write committed"
        );
        let projection = self.project_change(&change).await;
        Ok(Applied {
            value,
            change,
            projection,
        })
    }

    /// Projection phase for a committed change.
    pub async fn project_change(&self, change: &SettingsChange) -> ProjectionReport {
        if change.is_empty() {
            return ProjectionReport::default();
        }
        self.projector
            .project(&change.course_settings_ids, &change.removed_course_ids)
            .await
    }

    /// Re-project every course. Run by an operator after an outage; nothing
    /// schedules it.
    pub async fn resync_all(&self) -> Result<ProjectionReport, AppError> {
        let ids = {
            let conn = self.pool.get()?;
            course_repo::list_all_ids(&conn)?
        };
        tracing::info!(courses = ids.len(), "Resyncing every course projection");
        Ok(self.projector.project(&ids, std::iter::empty()).await)
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// The configuration a course's chatbot runs with, or `None` if the course
    /// has no settings row yet.
    pub fn effective_config(&self, course_id: i64) -> Result<Option<EffectiveConfig>, AppError> {
        let conn = self.pool.get()?;
        let Some(course) = course_repo::find_for_course(&conn, course_id)? else {
            return Ok(None);
        };
        let org = organization_settings::find(&conn, &course.org_settings_id)?;
        let default_provider = match org.default_provider_id {
            Some(ref id) => Some(providers::find(&conn, id)?),
            None => None,
        };
        let defaults = resolve_defaults(&org, default_provider.as_ref());
        Ok(Some(resolve_effective(&course, &defaults)))
    }

    // ── Organization settings ───────────────────────────────────────

    pub async fn create_organization_settings(
        &self,
        organization_id: i64,
        input: &CreateOrganizationSettingsInput,
    ) -> Result<Applied<OrganizationSettings>, AppError> {
        self.apply("create_organization_settings", |conn| {
            changes::create_organization_settings(conn, organization_id, input)
        })
        .await
    }

    pub async fn update_organization_settings(
        &self,
        id: &str,
        input: &UpdateOrganizationSettingsInput,
    ) -> Result<Applied<OrganizationSettings>, AppError> {
        self.apply("update_organization_settings", |conn| {
            changes::update_organization_settings(conn, id, input)
        })
        .await
    }

    pub async fn delete_organization_settings(&self, id: &str) -> Result<Applied<()>, AppError> {
        self.apply("delete_organization_settings", |conn| {
            changes::delete_organization_settings(conn, id).map(|c| ((), c))
        })
        .await
    }

    // ── Providers ───────────────────────────────────────────────────

    pub async fn create_provider(
        &self,
        org_settings_id: &str,
        input: &CreateProviderInput,
    ) -> Result<Applied<ChatbotProvider>, AppError> {
        self.apply("create_provider", |conn| {
            changes::create_provider(conn, org_settings_id, input)
        })
        .await
    }

    pub async fn update_provider(
        &self,
        id: &str,
        input: &UpdateProviderInput,
    ) -> Result<Applied<ChatbotProvider>, AppError> {
        self.apply("update_provider", |conn| changes::update_provider(conn, id, input))
            .await
    }

    pub async fn delete_provider(&self, id: &str) -> Result<Applied<()>, AppError> {
        self.apply("delete_provider", |conn| {
            changes::delete_provider(conn, id).map(|c| ((), c))
        })
        .await
    }

    // ── Models ──────────────────────────────────────────────────────

    pub async fn create_model(
        &self,
        provider_id: &str,
        input: &CreateModelInput,
    ) -> Result<Applied<ProviderModel>, AppError> {
        self.apply("create_model", |conn| changes::create_model(conn, provider_id, input))
            .await
    }

    pub async fn update_model(
        &self,
        id: &str,
        input: &UpdateModelInput,
    ) -> Result<Applied<ProviderModel>, AppError> {
        self.apply("update_model", |conn| changes::update_model(conn, id, input))
            .await
    }

    pub async fn delete_model(&self, id: &str) -> Result<Applied<()>, AppError> {
        self.apply("delete_model", |conn| {
            changes::delete_model(conn, id).map(|c| ((), c))
        })
        .await
    }

    // ── Courses ─────────────────────────────────────────────────────

    pub async fn upsert_course_settings(
        &self,
        course_id: i64,
        input: &UpsertCourseSettingsInput,
    ) -> Result<Applied<CourseSettings>, AppError> {
        self.apply("upsert_course_settings", |conn| {
            changes::upsert_course_settings(conn, course_id, input)
        })
        .await
    }

    pub async fn delete_course(&self, course_id: i64) -> Result<Applied<()>, AppError> {
        self.apply("delete_course", |conn| {
            changes::delete_course(conn, course_id).map(|c| ((), c))
        })
        .await
    }
}
