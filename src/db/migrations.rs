use rusqlite::Connection;

use crate::error::AppError;

/// Run the consolidated schema migration for the primary settings store.
pub fn run(conn: &Connection) -> Result<(), AppError> {
    tracing::debug!("Running database migrations");

    conn.execute_batch(SCHEMA)?;

    tracing::info!("Database migrations complete");
    Ok(())
}

/// Create the projection table in the chatbot service's database.
pub fn run_replica(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(REPLICA_SCHEMA)?;
    tracing::debug!("Replica schema ready");
    Ok(())
}

const SCHEMA: &str = r#"

-- ============================================================================
-- Organizations and courses (owned by the dashboard; kept minimal here so the
-- settings tables can reference them)
-- ============================================================================

CREATE TABLE IF NOT EXISTS organizations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS courses (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    organization_id INTEGER NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_courses_org ON courses(organization_id);

-- ============================================================================
-- Organization chatbot settings
-- ============================================================================

CREATE TABLE IF NOT EXISTS organization_settings (
    id                                      TEXT PRIMARY KEY,
    organization_id                         INTEGER NOT NULL UNIQUE REFERENCES organizations(id) ON DELETE CASCADE,
    default_provider_id                     TEXT REFERENCES chatbot_providers(id),
    default_prompt                          TEXT,
    default_temperature                     REAL,
    default_top_k                           INTEGER,
    default_similarity_threshold_documents  REAL,
    default_similarity_threshold_questions  REAL,
    created_at                              TEXT NOT NULL,
    updated_at                              TEXT NOT NULL
);

-- ============================================================================
-- Providers and their models
-- ============================================================================

CREATE TABLE IF NOT EXISTS chatbot_providers (
    id                      TEXT PRIMARY KEY,
    org_settings_id         TEXT NOT NULL REFERENCES organization_settings(id) ON DELETE CASCADE,
    provider_type           TEXT NOT NULL CHECK(provider_type IN ('openai', 'anthropic', 'ollama', 'openai_compatible')),
    nickname                TEXT,
    base_url                TEXT,
    headers                 TEXT NOT NULL DEFAULT '{}',
    api_key                 TEXT,
    default_model_id        TEXT REFERENCES provider_models(id),
    default_vision_model_id TEXT REFERENCES provider_models(id),
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_providers_org ON chatbot_providers(org_settings_id);

CREATE TABLE IF NOT EXISTS provider_models (
    id          TEXT PRIMARY KEY,
    provider_id TEXT NOT NULL REFERENCES chatbot_providers(id) ON DELETE CASCADE,
    model_name  TEXT NOT NULL,
    is_text     INTEGER NOT NULL DEFAULT 1,
    is_vision   INTEGER NOT NULL DEFAULT 0,
    is_thinking INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(provider_id, model_name)
);
CREATE INDEX IF NOT EXISTS idx_models_provider ON provider_models(provider_id);

-- ============================================================================
-- Course chatbot settings
-- ============================================================================

CREATE TABLE IF NOT EXISTS course_settings (
    id                                              TEXT PRIMARY KEY,
    course_id                                       INTEGER NOT NULL UNIQUE REFERENCES courses(id) ON DELETE CASCADE,
    org_settings_id                                 TEXT NOT NULL REFERENCES organization_settings(id) ON DELETE CASCADE,
    llm_id                                          TEXT REFERENCES provider_models(id),
    prompt                                          TEXT NOT NULL,
    temperature                                     REAL NOT NULL,
    top_k                                           INTEGER NOT NULL,
    similarity_threshold_documents                  REAL NOT NULL,
    similarity_threshold_questions                  REAL NOT NULL,
    using_default_model                             INTEGER NOT NULL DEFAULT 1,
    using_default_prompt                            INTEGER NOT NULL DEFAULT 1,
    using_default_temperature                       INTEGER NOT NULL DEFAULT 1,
    using_default_top_k                             INTEGER NOT NULL DEFAULT 1,
    using_default_similarity_threshold_documents    INTEGER NOT NULL DEFAULT 1,
    using_default_similarity_threshold_questions    INTEGER NOT NULL DEFAULT 1,
    created_at                                      TEXT NOT NULL,
    updated_at                                      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_course_settings_org ON course_settings(org_settings_id);
CREATE INDEX IF NOT EXISTS idx_course_settings_llm ON course_settings(llm_id);

"#;

// The chatbot service reuses its vector-store table shape for settings:
// `page_content` holds the course id as text, `metadata` the projected JSON.
const REPLICA_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS course_setting (
    id           TEXT PRIMARY KEY,
    page_content TEXT NOT NULL UNIQUE,
    metadata     TEXT NOT NULL,
    created_at   TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at   TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Incremental migrations for columns added after the initial schema.
/// Uses "ADD COLUMN ... IF NOT EXISTS" equivalent via PRAGMA table_info check.
pub fn run_incremental(conn: &Connection) -> Result<(), AppError> {
    // Thinking-capable models were introduced after the first provider rollout
    let has_is_thinking: bool = conn
        .prepare(
            "SELECT COUNT(*) FROM pragma_table_info('provider_models') WHERE name = 'is_thinking'",
        )?
        .query_row([], |row| row.get::<_, i64>(0))
        .map(|c| c > 0)
        .unwrap_or(false);

    if !has_is_thinking {
        conn.execute_batch(
            "ALTER TABLE provider_models ADD COLUMN is_thinking INTEGER NOT NULL DEFAULT 0;",
        )?;
        tracing::info!("Added is_thinking column to provider_models");
    }

    Ok(())
}
