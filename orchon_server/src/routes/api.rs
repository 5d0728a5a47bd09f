//! REST API under `/api`.

use std::collections::{BTreeMap, HashMap};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::dashboard::kpi;
use crate::db::{DbError, PgConn};
use crate::discovery::classify::{discover_from_package_json, PackageJson};
use crate::discovery::domain::extract_domain;
use crate::models::alert::{Alert, NewAlert};
use crate::models::check::{
    NewStatusCheck, NewUptimeCheck, ProjectStatus, StatusCheck, UptimeCheck,
};
use crate::models::cost::{CostEntry, NewCostEntry};
use crate::models::deployment::{DeployUpdate, ProcessedDeployment};
use crate::models::infra::{DiscoveryResult, TechStack};
use crate::routes::{events, AppState};
use crate::services::dns_service::DnsLookup;
use crate::services::github_service::RepoInfo;
use crate::services::project_service::ProjectOverview;
use crate::services::registry_service::OutdatedReport;
use crate::services::status_service::StatusReport;
use crate::services::{
    alert_service, check_service, cost_service, deployment_service, project_service,
    scanner_service, status_service,
};

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/projects", get(list_projects))
        .route("/projects/{id}/status", get(project_status))
        .route("/projects/{id}/deployments", get(project_deployments))
        .route("/projects/{id}/status/history", get(project_status_history))
        .route("/projects/{id}/uptime", get(project_uptime))
        .route("/deployments/recent", get(recent_deployments))
        .route("/deployments/commit/{sha}", post(correlate_commit))
        .route("/events", get(events::deployment_events))
        .route("/status-checks", post(create_status_check))
        .route("/uptime-checks", post(create_uptime_check))
        .route("/costs", get(list_costs).post(create_cost))
        .route("/alerts", post(create_alert))
        .route("/scan", get(scan))
        .route("/dns/{domain}", get(dns_lookup))
        .route("/repos/{owner}/{repo}", get(repo_details))
        .route("/packages/outdated", post(packages_outdated))
        .route("/kpi/success_rate", get(kpi_success_rate))
        .route("/kpi/phase_durations", get(kpi_phase_durations))
        .route("/kpi/deployments_by_status", get(kpi_deployments_by_status))
}

// ── Error mapping ──

async fn conn(state: &AppState) -> Result<PgConn, StatusCode> {
    state.db.conn().await.map_err(|e| {
        match e {
            DbError::NotConfigured => tracing::debug!("Database request without DATABASE_URL"),
            _ => tracing::warn!("Database unavailable: {e}"),
        }
        StatusCode::SERVICE_UNAVAILABLE
    })
}

fn internal(e: anyhow::Error) -> StatusCode {
    tracing::error!("Request failed: {e:#}");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn upstream(e: anyhow::Error) -> StatusCode {
    tracing::warn!("Upstream request failed: {e:#}");
    StatusCode::BAD_GATEWAY
}

// ── Query parameters ──

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}

#[derive(Debug, Deserialize)]
pub struct HoursQuery {
    pub hours: Option<i64>,
}

impl HoursQuery {
    fn hours(&self) -> i64 {
        self.hours.unwrap_or(24).clamp(1, 24 * 90)
    }
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i32>,
}

impl DaysQuery {
    fn days(&self) -> i32 {
        self.days.unwrap_or(30).clamp(1, 365)
    }
}

// ── Status ──

/// CI status of every catalog repository merged with backend health.
/// Without a database the backend side reads as unknown.
async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    let backend: HashMap<String, ProjectStatus> = match state.db.conn().await {
        Ok(mut conn) => match check_service::latest_for_all_projects(&mut conn).await {
            Ok(rows) => rows.into_iter().map(|s| (s.project_id.clone(), s)).collect(),
            Err(e) => {
                tracing::warn!("Failed to load backend statuses: {e:#}");
                HashMap::new()
            }
        },
        Err(e) => {
            tracing::debug!("Backend statuses unavailable: {e}");
            HashMap::new()
        }
    };

    Json(status_service::aggregate(&state.catalog, &state.config, &state.github, &backend).await)
}

// ── Projects ──

async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectOverview>>, StatusCode> {
    let mut conn = conn(&state).await?;
    let projects = project_service::list_projects(&mut conn).await.map_err(internal)?;
    Ok(Json(projects))
}

/// Latest status check of one project. 404 before its first check.
async fn project_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectStatus>, StatusCode> {
    let mut conn = conn(&state).await?;
    let latest = check_service::latest_for_project(&mut conn, &id)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(latest))
}

async fn project_deployments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<ProcessedDeployment>>, StatusCode> {
    let mut conn = conn(&state).await?;
    let deployments = deployment_service::recent_for_project(&mut conn, &id, q.limit())
        .await
        .map_err(internal)?;
    Ok(Json(deployments))
}

async fn project_status_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<HoursQuery>,
) -> Result<Json<Vec<StatusCheck>>, StatusCode> {
    let mut conn = conn(&state).await?;
    let history = check_service::status_history(&mut conn, &id, q.hours())
        .await
        .map_err(internal)?;
    Ok(Json(history))
}

async fn project_uptime(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<HoursQuery>,
) -> Result<Json<Vec<UptimeCheck>>, StatusCode> {
    let mut conn = conn(&state).await?;
    let history = check_service::uptime_history(&mut conn, &id, q.hours())
        .await
        .map_err(internal)?;
    Ok(Json(history))
}

// ── Deployments ──

async fn recent_deployments(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<ProcessedDeployment>>, StatusCode> {
    let mut conn = conn(&state).await?;
    let deployments = deployment_service::recent(&mut conn, q.limit())
        .await
        .map_err(internal)?;
    Ok(Json(deployments))
}

/// Hosting-side deploy report for a commit. 404 when no run built it.
async fn correlate_commit(
    State(state): State<AppState>,
    Path(sha): Path<String>,
    Json(update): Json<DeployUpdate>,
) -> Result<Json<ProcessedDeployment>, StatusCode> {
    let store = state.deployments.as_ref();
    let deployment = deployment_service::correlate_deploy(&state.catalog, store, &sha, &update)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    state.publish(deployment.clone());
    Ok(Json(deployment))
}

// ── Checks, costs, alerts ──

async fn create_status_check(
    State(state): State<AppState>,
    Json(check): Json<NewStatusCheck>,
) -> Result<(StatusCode, Json<StatusCheck>), StatusCode> {
    let mut conn = conn(&state).await?;
    let result = check_service::insert_status_check(&mut conn, check)
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn create_uptime_check(
    State(state): State<AppState>,
    Json(check): Json<NewUptimeCheck>,
) -> Result<(StatusCode, Json<UptimeCheck>), StatusCode> {
    let mut conn = conn(&state).await?;
    let result = check_service::insert_uptime_check(&mut conn, check)
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn list_costs(State(state): State<AppState>) -> Result<Json<Vec<CostEntry>>, StatusCode> {
    let mut conn = conn(&state).await?;
    let costs = cost_service::list_costs(&mut conn).await.map_err(internal)?;
    Ok(Json(costs))
}

async fn create_cost(
    State(state): State<AppState>,
    Json(entry): Json<NewCostEntry>,
) -> Result<(StatusCode, Json<CostEntry>), StatusCode> {
    if !cost_service::is_valid_month(&entry.month) || entry.amount_cents < 0 {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut conn = conn(&state).await?;
    let result = cost_service::insert_cost(&mut conn, entry).await.map_err(internal)?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub recorded: bool,
    pub alert: Option<Alert>,
}

async fn create_alert(
    State(state): State<AppState>,
    Json(alert): Json<NewAlert>,
) -> Result<Json<AlertResponse>, StatusCode> {
    let mut conn = conn(&state).await?;
    if project_service::get_project(&mut conn, &alert.project_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(StatusCode::NOT_FOUND);
    }

    let alert = alert_service::record_alert(&mut conn, alert).await.map_err(internal)?;
    Ok(Json(AlertResponse {
        recorded: alert.is_some(),
        alert,
    }))
}

// ── Discovery ──

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    pub project: Option<String>,
}

/// Scan one catalog project's checkout, or every project with one.
async fn scan(
    State(state): State<AppState>,
    Query(q): Query<ScanQuery>,
) -> Result<Json<Vec<DiscoveryResult>>, StatusCode> {
    let Some(project_id) = q.project else {
        return Ok(Json(scanner_service::scan_all(&state.dns, &state.catalog).await));
    };

    let project = state.catalog.project(&project_id).ok_or(StatusCode::NOT_FOUND)?;
    let Some(path) = &project.local_path else {
        tracing::info!(
            project_id = %project.id,
            "Scan requested for project without local checkout"
        );
        return Err(StatusCode::NOT_FOUND);
    };

    let result = scanner_service::scan_project(&state.dns, path, &project.id).await;
    Ok(Json(vec![result]))
}

#[derive(Debug, Deserialize)]
pub struct DnsQuery {
    pub project: Option<String>,
}

async fn dns_lookup(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(q): Query<DnsQuery>,
) -> Result<Json<DnsLookup>, StatusCode> {
    let domain = extract_domain(&domain);
    if domain.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let project_id = q.project.unwrap_or_default();
    match state.dns.lookup_domain(&domain, &project_id).await {
        Ok(lookup) => Ok(Json(lookup)),
        Err(e) => {
            tracing::warn!(domain = %domain, "DNS lookup failed: {e}");
            Err(StatusCode::BAD_GATEWAY)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RepoDetails {
    pub owner: String,
    pub repo: String,
    #[serde(flatten)]
    pub info: RepoInfo,
    /// Detected from package.json; absent when the repo has none.
    pub stack: Option<TechStack>,
}

async fn repo_details(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<RepoDetails>, StatusCode> {
    let Some(token) = state.config.github_token(&owner) else {
        tracing::info!(owner = %owner, "No GitHub token for owner");
        return Err(StatusCode::BAD_REQUEST);
    };

    let (info, package) = futures::join!(
        state.github.repo_info(&owner, &repo, token),
        state.github.package_json(&owner, &repo, token),
    );
    let info = info.map_err(upstream)?;

    let stack = match package {
        Ok(Some(value)) => match serde_json::from_value::<PackageJson>(value) {
            Ok(pkg) => Some(discover_from_package_json(&pkg, &repo).1),
            Err(e) => {
                tracing::warn!(owner = %owner, repo = %repo, "Unreadable package.json: {e}");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(owner = %owner, repo = %repo, "Failed to fetch package.json: {e:#}");
            None
        }
    };

    Ok(Json(RepoDetails {
        owner,
        repo,
        info,
        stack,
    }))
}

#[derive(Debug, Deserialize)]
pub struct OutdatedRequest {
    /// Package name to declared version range.
    pub packages: BTreeMap<String, String>,
}

/// Compare declared versions against the registry, in package name order.
async fn packages_outdated(
    State(state): State<AppState>,
    Json(req): Json<OutdatedRequest>,
) -> Json<OutdatedReport> {
    let packages: Vec<(String, String)> = req.packages.into_iter().collect();
    Json(state.registry.check_outdated(&packages).await)
}

// ── KPIs ──

async fn kpi_success_rate(
    State(state): State<AppState>,
    Query(q): Query<DaysQuery>,
) -> Result<Json<kpi::DeploymentSuccessRate>, StatusCode> {
    let mut conn = conn(&state).await?;
    let result = kpi::query_success_rate(&mut conn, q.days()).await.map_err(internal)?;
    Ok(Json(result))
}

async fn kpi_phase_durations(
    State(state): State<AppState>,
    Query(q): Query<DaysQuery>,
) -> Result<Json<kpi::PhaseDurations>, StatusCode> {
    let mut conn = conn(&state).await?;
    let result = kpi::query_phase_durations(&mut conn, q.days()).await.map_err(internal)?;
    Ok(Json(result))
}

async fn kpi_deployments_by_status(
    State(state): State<AppState>,
    Query(q): Query<DaysQuery>,
) -> Result<Json<Vec<kpi::DeploymentsByStatus>>, StatusCode> {
    let mut conn = conn(&state).await?;
    let result = kpi::query_deployments_by_status(&mut conn, q.days())
        .await
        .map_err(internal)?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::routes::router;
    use crate::routes::tests::test_state;
    use crate::services::deployment_service::memory::MemoryDeploymentStore;

    use super::*;

    async fn send(state: AppState, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router(state).oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn database_routes_report_unavailable() {
        for uri in [
            "/api/projects",
            "/api/projects/web/status",
            "/api/deployments/recent?limit=5",
            "/api/costs",
            "/api/kpi/success_rate?days=7",
        ] {
            let state = test_state("", Arc::new(MemoryDeploymentStore::default()));
            let (status, _) = send(state, get(uri)).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        }
    }

    #[tokio::test]
    async fn invalid_cost_is_rejected_before_database() {
        let state = test_state("", Arc::new(MemoryDeploymentStore::default()));
        let (status, _) = send(
            state,
            json_post(
                "/api/costs",
                serde_json::json!({
                    "project_id": "web",
                    "month": "2024-13",
                    "amount_cents": 100,
                    "provider": "fly"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn commit_correlation_updates_and_publishes() {
        let store = Arc::new(MemoryDeploymentStore::default());
        let state = test_state("", store.clone());
        let mut events = state.events.subscribe();

        let run: crate::models::workflow_run::WorkflowRunPayload =
            serde_json::from_value(serde_json::json!({
                "action": "completed",
                "workflow_run": {
                    "id": 5,
                    "name": "CI",
                    "status": "completed",
                    "conclusion": "success",
                    "html_url": null,
                    "head_sha": "feedbeef",
                    "head_branch": "main",
                    "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-01-01T00:04:00Z"
                },
                "repository": { "name": "web", "owner": { "login": "acme" } }
            }))
            .unwrap();
        deployment_service::handle_workflow_run(&state.catalog, store.as_ref(), &run)
            .await
            .unwrap();

        let (status, json) = send(
            state.clone(),
            json_post(
                "/api/deployments/commit/feedbeef",
                serde_json::json!({
                    "deploy_completed_at": "2024-01-01T00:06:00Z",
                    "status": "success",
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], "gh-5");
        assert_eq!(json["project_id"], "web");
        assert_eq!(json["deploy_completed_at"], "2024-01-01T00:06:00Z");
        assert_eq!(events.try_recv().unwrap().id, "gh-5");

        let (status, _) = send(
            state,
            json_post("/api/deployments/commit/unknown", serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn scan_of_unknown_project_is_not_found() {
        let state = test_state("", Arc::new(MemoryDeploymentStore::default()));
        let (status, _) = send(state, get("/api/scan?project=nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn repo_details_need_an_owner_token() {
        let state = test_state("", Arc::new(MemoryDeploymentStore::default()));
        let (status, _) = send(state, get("/api/repos/acme/web")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_without_tokens_or_database_is_unknown() {
        let state = test_state("", Arc::new(MemoryDeploymentStore::default()));
        let (status, json) = send(state, get("/api/status")).await;

        assert_eq!(status, StatusCode::OK);
        let statuses = json["statuses"].as_array().unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0]["ci_status"], "unknown");
    }
}
