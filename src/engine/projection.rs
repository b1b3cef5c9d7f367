//! Projection of course settings into the chatbot service.
//!
//! Runs after the primary transaction has committed. For each affected course
//! the effective configuration is rebuilt and compared with what the service
//! already stores; only a real difference costs a network call. When the
//! service is unreachable the same write goes straight to its table.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::Connection;

use crate::chatbot::types::{ModelDescriptor, OrganizationDescriptor};
use crate::chatbot::{ChatbotSettingsApi, CourseSettingsMetadata, ReplicaStore};
use crate::db::models::{ChatbotProvider, CourseSettings, OrganizationSettings, ProviderModel};
use crate::db::repos::{
    course_settings as course_repo, llm_models, organization_settings, providers,
};
use crate::db::DbPool;
use crate::engine::resolve::{resolve_defaults, resolve_effective};
use crate::error::AppError;

// ── Metadata ────────────────────────────────────────────────────────

/// Everything a course projection depends on, loaded by id.
#[derive(Debug, Clone)]
pub struct ProjectionContext {
    pub course: CourseSettings,
    pub org: OrganizationSettings,
    pub default_provider: Option<ChatbotProvider>,
    /// The course's effective model and the provider that owns it.
    pub model: Option<(ProviderModel, ChatbotProvider)>,
    pub default_model_name: Option<String>,
    pub default_vision_model_name: Option<String>,
}

fn model_name(conn: &Connection, id: Option<&str>) -> Result<Option<String>, AppError> {
    match id {
        Some(id) => Ok(Some(llm_models::find(conn, id)?.model_name)),
        None => Ok(None),
    }
}

pub fn load_context(
    conn: &Connection,
    course_settings_id: &str,
) -> Result<ProjectionContext, AppError> {
    let course = course_repo::find(conn, course_settings_id)?;
    let org = organization_settings::find(conn, &course.org_settings_id)?;
    let default_provider = match org.default_provider_id {
        Some(ref id) => Some(providers::find(conn, id)?),
        None => None,
    };

    let defaults = resolve_defaults(&org, default_provider.as_ref());
    let effective = resolve_effective(&course, &defaults);

    let (model, default_model_name, default_vision_model_name) = match effective.llm_id {
        Some(ref llm_id) => {
            let model = llm_models::find(conn, llm_id)?;
            let provider = providers::find(conn, &model.provider_id)?;
            let default_name = model_name(conn, provider.default_model_id.as_deref())?;
            let vision_name = model_name(conn, provider.default_vision_model_id.as_deref())?;
            (Some((model, provider)), default_name, vision_name)
        }
        None => (None, None, None),
    };

    Ok(ProjectionContext {
        course,
        org,
        default_provider,
        model,
        default_model_name,
        default_vision_model_name,
    })
}

/// Flatten a loaded context into the wire shape. Pure.
pub fn build_metadata(ctx: &ProjectionContext) -> CourseSettingsMetadata {
    let defaults = resolve_defaults(&ctx.org, ctx.default_provider.as_ref());
    let effective = resolve_effective(&ctx.course, &defaults);

    let model = ctx.model.as_ref().map(|(model, provider)| ModelDescriptor {
        provider_type: provider.provider_type.clone(),
        headers: provider
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<BTreeMap<_, _>>(),
        base_url: provider.base_url.clone(),
        model_name: model.model_name.clone(),
        default_model_name: ctx.default_model_name.clone(),
        default_vision_model_name: ctx.default_vision_model_name.clone(),
    });

    CourseSettingsMetadata {
        organization_settings: OrganizationDescriptor {
            id: ctx.org.id.clone(),
            organization_id: ctx.org.organization_id,
            default_provider_id: ctx.org.default_provider_id.clone(),
        },
        model,
        prompt: effective.prompt,
        temperature: effective.temperature,
        top_k: effective.top_k,
        similarity_threshold_documents: effective.similarity_threshold_documents,
        similarity_threshold_questions: effective.similarity_threshold_questions,
    }
}

// ── Sync ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    Created,
    Updated,
    Removed,
    /// Nothing to do: identical metadata, trivial metadata, or no row to remove.
    Skipped,
    CreatedViaFallback,
    UpdatedViaFallback,
    RemovedViaFallback,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
    pub fallback_writes: usize,
    pub failed: usize,
}

impl ProjectionReport {
    fn record(&mut self, outcome: ProjectionOutcome) {
        match outcome {
            ProjectionOutcome::Created => self.created += 1,
            ProjectionOutcome::Updated => self.updated += 1,
            ProjectionOutcome::Removed => self.removed += 1,
            ProjectionOutcome::Skipped => self.skipped += 1,
            ProjectionOutcome::CreatedViaFallback => {
                self.created += 1;
                self.fallback_writes += 1;
            }
            ProjectionOutcome::UpdatedViaFallback => {
                self.updated += 1;
                self.fallback_writes += 1;
            }
            ProjectionOutcome::RemovedViaFallback => {
                self.removed += 1;
                self.fallback_writes += 1;
            }
        }
    }

    /// Writes that reached the chatbot service or its table.
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.removed
    }
}

pub struct ProjectionSync {
    pool: DbPool,
    api: Arc<dyn ChatbotSettingsApi>,
    replica: ReplicaStore,
}

impl ProjectionSync {
    pub fn new(pool: DbPool, api: Arc<dyn ChatbotSettingsApi>, replica: ReplicaStore) -> Self {
        Self { pool, api, replica }
    }

    /// Recompute and push one course's projection.
    ///
    /// Non-500 API errors are returned; the caller decides whether to log.
    pub async fn sync_course(
        &self,
        course_settings_id: &str,
    ) -> Result<ProjectionOutcome, AppError> {
        let (course_id, metadata) = {
            let conn = self.pool.get()?;
            let ctx = load_context(&conn, course_settings_id)?;
            (ctx.course.course_id, build_metadata(&ctx))
        };

        match self.replica.get(course_id)? {
            None if metadata.is_trivial() => {
                tracing::debug!(course_id, "No model resolved, nothing to project");
                Ok(ProjectionOutcome::Skipped)
            }
            None => match self.api.create(course_id, &metadata).await {
                Ok(()) => Ok(ProjectionOutcome::Created),
                Err(e) if e.is_service_unreachable() => {
                    tracing::warn!(
                        course_id,
                        error = %e,
                        "Chatbot API unreachable, inserting projection directly"
                    );
                    self.replica.insert(course_id, &metadata)?;
                    Ok(ProjectionOutcome::CreatedViaFallback)
                }
                Err(e) => Err(e),
            },
            Some(stored) => {
                if stored == metadata.to_stored_value()? {
                    tracing::debug!(course_id, "Projection unchanged, skipping");
                    return Ok(ProjectionOutcome::Skipped);
                }
                match self.api.update(course_id, &metadata).await {
                    Ok(()) => Ok(ProjectionOutcome::Updated),
                    Err(e) if e.is_service_unreachable() => {
                        tracing::warn!(
                            course_id,
                            error = %e,
                            "Chatbot API unreachable, updating projection directly"
                        );
                        self.replica.update(course_id, &metadata)?;
                        Ok(ProjectionOutcome::UpdatedViaFallback)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Remove a deleted course's projection.
    pub async fn remove_course(&self, course_id: i64) -> Result<ProjectionOutcome, AppError> {
        if self.replica.get(course_id)?.is_none() {
            tracing::debug!(course_id, "No projection stored, nothing to remove");
            return Ok(ProjectionOutcome::Skipped);
        }
        match self.api.delete(course_id).await {
            Ok(()) => Ok(ProjectionOutcome::Removed),
            Err(e) if e.is_service_unreachable() => {
                tracing::warn!(
                    course_id,
                    error = %e,
                    "Chatbot API unreachable, deleting projection directly"
                );
                self.replica.delete(course_id)?;
                Ok(ProjectionOutcome::RemovedViaFallback)
            }
            Err(e) => Err(e),
        }
    }

    /// Project every listed row and remove every listed course. Failures are
    /// logged and counted, never returned.
    pub async fn project<'a>(
        &self,
        course_settings_ids: impl IntoIterator<Item = &'a String>,
        removed_course_ids: impl IntoIterator<Item = &'a i64>,
    ) -> ProjectionReport {
        let mut report = ProjectionReport::default();

        for id in course_settings_ids {
            match self.sync_course(id).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    tracing::error!(
                        course_settings_id = %id,
                        error = %e,
                        "Course settings projection failed"
                    );
                    report.failed += 1;
                }
            }
        }
        for course_id in removed_course_ids {
            match self.remove_course(*course_id).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    tracing::error!(
                        course_id,
                        error = %e,
                        "Course settings projection removal failed"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.writes() > 0 || report.failed > 0 {
            tracing::info!(
                created = report.created,
                updated = report.updated,
                removed = report.removed,
                skipped = report.skipped,
                fallback = report.fallback_writes,
                failed = report.failed,
                "Projection pass finished"
            );
        }
        report
    }
}
