//! Schema migration for the observatory tables.

use diesel_async::AsyncPgConnection;
use diesel_async::SimpleAsyncConnection;

/// SQL migration for all observatory tables. Idempotent.
pub const MIGRATION_SQL: &str = r#"
-- ================================================================
-- Observatory tables
-- ================================================================

CREATE TABLE IF NOT EXISTS projects (
    id              VARCHAR(255) PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    display_name    VARCHAR(255) NOT NULL,
    repo_owner      VARCHAR(255) NOT NULL,
    repo_name       VARCHAR(255) NOT NULL,
    alert_level     VARCHAR(32) NOT NULL DEFAULT 'all',
    alert_email     VARCHAR(255),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_projects_repo ON projects (repo_owner, repo_name);

CREATE TABLE IF NOT EXISTS services (
    id              VARCHAR(255) PRIMARY KEY,
    project_id      VARCHAR(255) NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    category        VARCHAR(32) NOT NULL,
    provider        VARCHAR(64) NOT NULL,
    service_name    VARCHAR(255) NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_services_project ON services (project_id);

CREATE TABLE IF NOT EXISTS deployments (
    id                  VARCHAR(255) PRIMARY KEY,
    service_id          VARCHAR(255) NOT NULL REFERENCES services(id) ON DELETE CASCADE,
    provider            VARCHAR(32) NOT NULL,
    status              VARCHAR(32) NOT NULL,
    commit_sha          VARCHAR(64),
    branch              VARCHAR(255),
    run_url             VARCHAR(1024),
    started_at          TIMESTAMPTZ,
    completed_at        TIMESTAMPTZ,
    pushed_at           TIMESTAMPTZ,
    ci_started_at       TIMESTAMPTZ,
    ci_completed_at     TIMESTAMPTZ,
    deploy_started_at   TIMESTAMPTZ,
    deploy_completed_at TIMESTAMPTZ,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_deployments_service ON deployments (service_id);
CREATE INDEX IF NOT EXISTS idx_deployments_commit ON deployments (commit_sha);
CREATE INDEX IF NOT EXISTS idx_deployments_created ON deployments (created_at DESC);

CREATE TABLE IF NOT EXISTS status_checks (
    id              BIGSERIAL PRIMARY KEY,
    service_id      VARCHAR(255) NOT NULL REFERENCES services(id) ON DELETE CASCADE,
    status          VARCHAR(32) NOT NULL,
    message         TEXT,
    checked_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_status_checks_service ON status_checks (service_id, checked_at DESC);

CREATE TABLE IF NOT EXISTS uptime_checks (
    id               BIGSERIAL PRIMARY KEY,
    service_id       VARCHAR(255) NOT NULL REFERENCES services(id) ON DELETE CASCADE,
    url              VARCHAR(1024),
    response_time_ms INTEGER,
    status_code      INTEGER,
    is_up            BOOLEAN NOT NULL,
    error_message    TEXT,
    checked_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_uptime_checks_service ON uptime_checks (service_id, checked_at DESC);

CREATE TABLE IF NOT EXISTS cost_entries (
    id              BIGSERIAL PRIMARY KEY,
    project_id      VARCHAR(255) NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    month           VARCHAR(7) NOT NULL,
    amount_cents    BIGINT NOT NULL,
    provider        VARCHAR(64) NOT NULL,
    notes           TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS alerts (
    id              BIGSERIAL PRIMARY KEY,
    project_id      VARCHAR(255) NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    service_id      VARCHAR(255) REFERENCES services(id) ON DELETE SET NULL,
    alert_type      VARCHAR(64) NOT NULL,
    message         TEXT NOT NULL,
    channel         VARCHAR(32) NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_alerts_project ON alerts (project_id, created_at DESC);
"#;

/// Run the observatory migration.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("observatory migration failed: {e}"))?;
    Ok(())
}
