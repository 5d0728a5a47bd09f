//! Deployment tracking: webhook runs to stored deployment rows, and deploy
//! correlation by commit.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Timestamptz, Varchar};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::catalog::Catalog;
use crate::db::Database;
use crate::events::deployment::record_from_workflow_run;
use crate::models::deployment::{
    DeployUpdate, Deployment, DeploymentRecord, ProcessedDeployment,
};
use crate::models::workflow_run::WorkflowRunPayload;
use crate::schema::{deployments, services};

const RETURNING: &str = "RETURNING id, service_id, provider, status, commit_sha, branch, run_url, \
     started_at, completed_at, pushed_at, ci_started_at, ci_completed_at, \
     deploy_started_at, deploy_completed_at, created_at";

/// Where deployment rows live.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert or merge a record keyed by its id.
    async fn upsert(&self, record: &DeploymentRecord) -> anyhow::Result<Deployment>;

    /// Apply a deploy report to every row with `sha`; returns the most recent.
    async fn update_by_commit(
        &self,
        sha: &str,
        update: &DeployUpdate,
    ) -> anyhow::Result<Option<Deployment>>;
}

/// Postgres-backed store. Checks out a connection per call.
pub struct PgDeploymentStore {
    db: Database,
}

impl PgDeploymentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeploymentStore for PgDeploymentStore {
    async fn upsert(&self, record: &DeploymentRecord) -> anyhow::Result<Deployment> {
        let mut conn = self.db.conn().await?;
        upsert(&mut conn, record).await
    }

    async fn update_by_commit(
        &self,
        sha: &str,
        update: &DeployUpdate,
    ) -> anyhow::Result<Option<Deployment>> {
        let mut conn = self.db.conn().await?;
        update_by_commit(&mut conn, sha, update).await
    }
}

/// Upsert keyed by id. Status is replaced; every other nullable column
/// keeps its stored value when one exists.
pub async fn upsert(
    conn: &mut AsyncPgConnection,
    record: &DeploymentRecord,
) -> anyhow::Result<Deployment> {
    let query = format!(
        "INSERT INTO deployments \
            (id, service_id, provider, status, commit_sha, branch, run_url, \
             started_at, completed_at, pushed_at, ci_started_at, ci_completed_at, \
             deploy_started_at, deploy_completed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         ON CONFLICT (id) DO UPDATE SET \
            status = EXCLUDED.status, \
            commit_sha = COALESCE(deployments.commit_sha, EXCLUDED.commit_sha), \
            branch = COALESCE(deployments.branch, EXCLUDED.branch), \
            run_url = COALESCE(deployments.run_url, EXCLUDED.run_url), \
            started_at = COALESCE(deployments.started_at, EXCLUDED.started_at), \
            completed_at = COALESCE(deployments.completed_at, EXCLUDED.completed_at), \
            pushed_at = COALESCE(deployments.pushed_at, EXCLUDED.pushed_at), \
            ci_started_at = COALESCE(deployments.ci_started_at, EXCLUDED.ci_started_at), \
            ci_completed_at = COALESCE(deployments.ci_completed_at, EXCLUDED.ci_completed_at), \
            deploy_started_at = \
                COALESCE(deployments.deploy_started_at, EXCLUDED.deploy_started_at), \
            deploy_completed_at = \
                COALESCE(deployments.deploy_completed_at, EXCLUDED.deploy_completed_at) \
         {RETURNING}"
    );

    let phases = &record.phases;
    let row = diesel::sql_query(query)
        .bind::<Varchar, _>(&record.id)
        .bind::<Varchar, _>(&record.service_id)
        .bind::<Varchar, _>(&record.provider)
        .bind::<Varchar, _>(record.status.as_str())
        .bind::<Nullable<Varchar>, _>(record.commit_sha.as_deref())
        .bind::<Nullable<Varchar>, _>(record.branch.as_deref())
        .bind::<Nullable<Varchar>, _>(record.run_url.as_deref())
        .bind::<Nullable<Timestamptz>, _>(record.started_at)
        .bind::<Nullable<Timestamptz>, _>(record.completed_at)
        .bind::<Nullable<Timestamptz>, _>(phases.pushed_at)
        .bind::<Nullable<Timestamptz>, _>(phases.ci_started_at)
        .bind::<Nullable<Timestamptz>, _>(phases.ci_completed_at)
        .bind::<Nullable<Timestamptz>, _>(phases.deploy_started_at)
        .bind::<Nullable<Timestamptz>, _>(phases.deploy_completed_at)
        .get_result::<Deployment>(conn)
        .await?;

    Ok(row)
}

/// Fill unset deploy timestamps on every row with `sha`, overwriting
/// status only when one is supplied.
pub async fn update_by_commit(
    conn: &mut AsyncPgConnection,
    sha: &str,
    update: &DeployUpdate,
) -> anyhow::Result<Option<Deployment>> {
    let query = format!(
        "UPDATE deployments SET \
            deploy_started_at = COALESCE(deploy_started_at, $2), \
            deploy_completed_at = COALESCE(deploy_completed_at, $3), \
            status = COALESCE($4, status) \
         WHERE commit_sha = $1 \
         {RETURNING}"
    );

    let rows: Vec<Deployment> = diesel::sql_query(query)
        .bind::<Varchar, _>(sha)
        .bind::<Nullable<Timestamptz>, _>(update.deploy_started_at)
        .bind::<Nullable<Timestamptz>, _>(update.deploy_completed_at)
        .bind::<Nullable<Varchar>, _>(update.status.map(|s| s.as_str()))
        .load(conn)
        .await?;

    Ok(rows.into_iter().max_by_key(|d| d.created_at))
}

/// Most recent deployments of one project.
pub async fn recent_for_project(
    conn: &mut AsyncPgConnection,
    project_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<ProcessedDeployment>> {
    let rows: Vec<Deployment> = deployments::table
        .inner_join(services::table)
        .filter(services::project_id.eq(project_id))
        .order(deployments::created_at.desc())
        .limit(limit)
        .select(Deployment::as_select())
        .load(conn)
        .await?;

    rows.iter()
        .map(|row| ProcessedDeployment::from_row(project_id, row))
        .collect()
}

/// Most recent deployments across all projects.
pub async fn recent(
    conn: &mut AsyncPgConnection,
    limit: i64,
) -> anyhow::Result<Vec<ProcessedDeployment>> {
    let rows: Vec<(Deployment, String)> = deployments::table
        .inner_join(services::table)
        .order(deployments::created_at.desc())
        .limit(limit)
        .select((Deployment::as_select(), services::project_id))
        .load(conn)
        .await?;

    rows.iter()
        .map(|(row, project_id)| ProcessedDeployment::from_row(project_id, row))
        .collect()
}

/// Process a `workflow_run` webhook.
///
/// Returns `None` for repositories outside the catalog or projects without
/// a GitHub CI service. A failed write is logged and the computed
/// deployment is returned anyway.
pub async fn handle_workflow_run(
    catalog: &Catalog,
    store: &dyn DeploymentStore,
    payload: &WorkflowRunPayload,
) -> Option<ProcessedDeployment> {
    let owner = &payload.repository.owner.login;
    let repo = &payload.repository.name;

    let Some(project) = catalog.project_by_repo(owner, repo) else {
        tracing::info!(
            owner = %owner,
            repo = %repo,
            "No project mapped for repository, ignoring run"
        );
        return None;
    };
    let Some(ci) = project.ci_service() else {
        tracing::info!(
            project_id = %project.id,
            "Project has no GitHub CI service, ignoring run"
        );
        return None;
    };

    let record = record_from_workflow_run(&project.service_id(ci), payload);
    let workflow_name = payload.workflow_run.name.clone();
    crate::metrics::deployment_status_changed(record.status.as_str());

    match store.upsert(&record).await {
        Ok(row) => {
            tracing::info!(
                deployment_id = %row.id,
                project_id = %project.id,
                status = %row.status,
                "Deployment recorded"
            );
            match ProcessedDeployment::from_row(&project.id, &row) {
                Ok(mut stored) => {
                    stored.workflow_name = workflow_name;
                    Some(stored)
                }
                Err(e) => {
                    tracing::warn!(
                        deployment_id = %row.id,
                        status = %row.status,
                        "Stored deployment unreadable, returning computed record: {e}"
                    );
                    Some(ProcessedDeployment::from_record(
                        &project.id,
                        &record,
                        workflow_name,
                    ))
                }
            }
        }
        Err(e) => {
            tracing::error!(deployment_id = %record.id, "Failed to persist deployment: {e}");
            crate::metrics::deployment_persist_failed();
            Some(ProcessedDeployment::from_record(&project.id, &record, workflow_name))
        }
    }
}

/// Record a hosting-side deploy against the runs that built `sha`.
///
/// `None` when no run built the commit, or when the newest matching run
/// belongs to a service the catalog no longer lists.
pub async fn correlate_deploy(
    catalog: &Catalog,
    store: &dyn DeploymentStore,
    sha: &str,
    update: &DeployUpdate,
) -> anyhow::Result<Option<ProcessedDeployment>> {
    let Some(row) = store.update_by_commit(sha, update).await? else {
        tracing::debug!(commit_sha = %sha, "No deployment found for commit");
        return Ok(None);
    };

    let Some(project) = catalog.project_for_service(&row.service_id) else {
        tracing::warn!(
            deployment_id = %row.id,
            service_id = %row.service_id,
            "Deploy correlated to a service outside the catalog, not reporting it"
        );
        return Ok(None);
    };

    tracing::info!(
        deployment_id = %row.id,
        commit_sha = %sha,
        status = %row.status,
        "Deploy correlated"
    );
    ProcessedDeployment::from_row(&project.id, &row).map(Some)
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory store for handler tests. Mirrors the upsert rules: status
    /// replaced, everything else kept once set.
    #[derive(Default)]
    pub struct MemoryDeploymentStore {
        rows: Mutex<HashMap<String, Deployment>>,
    }

    impl MemoryDeploymentStore {
        pub fn get(&self, id: &str) -> Option<Deployment> {
            self.rows.lock().unwrap().get(id).cloned()
        }
    }

    fn new_row(record: &DeploymentRecord) -> Deployment {
        let phases = &record.phases;
        Deployment {
            id: record.id.clone(),
            service_id: record.service_id.clone(),
            provider: record.provider.clone(),
            status: record.status.as_str().to_string(),
            commit_sha: record.commit_sha.clone(),
            branch: record.branch.clone(),
            run_url: record.run_url.clone(),
            started_at: record.started_at,
            completed_at: record.completed_at,
            pushed_at: phases.pushed_at,
            ci_started_at: phases.ci_started_at,
            ci_completed_at: phases.ci_completed_at,
            deploy_started_at: phases.deploy_started_at,
            deploy_completed_at: phases.deploy_completed_at,
            created_at: chrono::Utc::now(),
        }
    }

    #[async_trait]
    impl DeploymentStore for MemoryDeploymentStore {
        async fn upsert(&self, record: &DeploymentRecord) -> anyhow::Result<Deployment> {
            let mut rows = self.rows.lock().unwrap();
            let incoming = new_row(record);
            let row = match rows.remove(&record.id) {
                None => incoming,
                Some(row) => Deployment {
                    status: incoming.status,
                    commit_sha: row.commit_sha.or(incoming.commit_sha),
                    branch: row.branch.or(incoming.branch),
                    run_url: row.run_url.or(incoming.run_url),
                    started_at: row.started_at.or(incoming.started_at),
                    completed_at: row.completed_at.or(incoming.completed_at),
                    pushed_at: row.pushed_at.or(incoming.pushed_at),
                    ci_started_at: row.ci_started_at.or(incoming.ci_started_at),
                    ci_completed_at: row.ci_completed_at.or(incoming.ci_completed_at),
                    deploy_started_at: row.deploy_started_at.or(incoming.deploy_started_at),
                    deploy_completed_at: row.deploy_completed_at.or(incoming.deploy_completed_at),
                    ..row
                },
            };
            rows.insert(row.id.clone(), row.clone());
            Ok(row)
        }

        async fn update_by_commit(
            &self,
            sha: &str,
            update: &DeployUpdate,
        ) -> anyhow::Result<Option<Deployment>> {
            let mut rows = self.rows.lock().unwrap();
            let mut updated = Vec::new();
            for row in rows.values_mut() {
                if row.commit_sha.as_deref() != Some(sha) {
                    continue;
                }
                row.deploy_started_at = row.deploy_started_at.or(update.deploy_started_at);
                row.deploy_completed_at = row.deploy_completed_at.or(update.deploy_completed_at);
                if let Some(status) = update.status {
                    row.status = status.as_str().to_string();
                }
                updated.push(row.clone());
            }
            Ok(updated.into_iter().max_by_key(|d| d.created_at))
        }
    }

    /// Store whose writes always fail.
    pub struct FailingStore;

    #[async_trait]
    impl DeploymentStore for FailingStore {
        async fn upsert(&self, _record: &DeploymentRecord) -> anyhow::Result<Deployment> {
            anyhow::bail!("connection refused")
        }

        async fn update_by_commit(
            &self,
            _sha: &str,
            _update: &DeployUpdate,
        ) -> anyhow::Result<Option<Deployment>> {
            anyhow::bail!("connection refused")
        }
    }
}
