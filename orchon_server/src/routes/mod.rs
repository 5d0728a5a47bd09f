//! HTTP routes: webhook, health, REST API and the live deployment stream.

pub mod api;
pub mod events;
pub mod webhook;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tokio::sync::broadcast;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::catalog::Catalog;
use crate::config::OrchonConfig;
use crate::db::{Database, DbStatus};
use crate::models::deployment::ProcessedDeployment;
use crate::services::deployment_service::{DeploymentStore, PgDeploymentStore};
use crate::services::dns_service::DohClient;
use crate::services::github_service::GithubClient;
use crate::services::registry_service::RegistryClient;

/// Buffered deployment events per live listener before it starts lagging.
const EVENT_BUFFER: usize = 256;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<OrchonConfig>,
    pub catalog: Arc<Catalog>,
    pub github: GithubClient,
    pub dns: DohClient,
    pub registry: RegistryClient,
    pub deployments: Arc<dyn DeploymentStore>,
    pub events: broadcast::Sender<ProcessedDeployment>,
}

impl AppState {
    pub fn new(db: Database, config: OrchonConfig, catalog: Catalog) -> Self {
        let store = Arc::new(PgDeploymentStore::new(db.clone()));
        Self::with_store(db, config, catalog, store)
    }

    /// State with an explicit deployment store.
    pub fn with_store(
        db: Database,
        config: OrchonConfig,
        catalog: Catalog,
        deployments: Arc<dyn DeploymentStore>,
    ) -> Self {
        let http = reqwest::Client::new();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            github: GithubClient::new(http.clone(), &config.github_api_url),
            dns: DohClient::new(http.clone(), &config.doh_url),
            registry: RegistryClient::new(http, &config.npm_registry_url),
            db,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            deployments,
            events,
        }
    }

    /// Push a deployment to live listeners. No listeners is not an error.
    pub fn publish(&self, deployment: ProcessedDeployment) {
        let _ = self.events.send(deployment);
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/github", post(webhook_handler))
        .route("/health", get(health))
        .nest("/api", api::api_router())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Webhook ──

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    crate::metrics::webhook_received(
        headers
            .get("x-github-event")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown"),
    );

    webhook::handle_webhook(&state, &headers, body).await
}

// ── Health ──

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: DbStatus,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = state.db.status().await;
    Json(HealthResponse {
        status: if database.connected { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::deployment_service::memory::MemoryDeploymentStore;
    use axum::body::Body;
    use axum::http::Request;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tower::ServiceExt;

    pub(crate) const CATALOG: &str = r#"
[[owners]]
login = "acme"
token_env = "PAT_ACME"
repos = ["web"]

[[projects]]
id = "web"
display_name = "Web"
owner = "acme"
repo = "web"
deploy_mechanism = "github-actions"

[[projects.services]]
category = "ci"
provider = "github"
name = "GitHub Actions"
"#;

    pub(crate) fn test_state(secret: &str, store: Arc<dyn DeploymentStore>) -> AppState {
        let catalog = Catalog::from_toml_str(CATALOG).unwrap();
        let secret = secret.to_string();
        let config = OrchonConfig::from_lookup(&catalog, |k| {
            (k == "ORCHON_WEBHOOK_SECRET").then(|| secret.clone())
        });
        AppState::with_store(Database::new(None, 1), config, catalog, store)
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn run_body(action: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "action": action,
            "workflow_run": {
                "id": 99,
                "name": "Deploy",
                "status": "queued",
                "conclusion": null,
                "html_url": "https://github.com/acme/web/actions/runs/99",
                "head_sha": "abc123",
                "head_branch": "main",
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z"
            },
            "repository": { "name": "web", "owner": { "login": "acme" } }
        }))
        .unwrap()
    }

    fn webhook_request(body: Vec<u8>, signature: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhooks/github")
            .header("content-type", "application/json")
            .header("x-github-event", "workflow_run")
            .header("x-hub-signature-256", signature)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn signed_workflow_run_is_recorded_and_published() {
        let store = Arc::new(MemoryDeploymentStore::default());
        let state = test_state("s3cret", store.clone());
        let mut events = state.events.subscribe();

        let body = run_body("requested");
        let signature = sign("s3cret", &body);
        let resp = router(state)
            .oneshot(webhook_request(body, &signature))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(store.get("gh-99").unwrap().status, "queued");
        let published = events.try_recv().unwrap();
        assert_eq!(published.id, "gh-99");
        assert_eq!(published.project_id, "web");
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let store = Arc::new(MemoryDeploymentStore::default());
        let state = test_state("s3cret", store.clone());

        let body = run_body("requested");
        let signature = sign("wrong", &body);
        let resp = router(state)
            .oneshot(webhook_request(body, &signature))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(store.get("gh-99").is_none());
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let state = test_state("", Arc::new(MemoryDeploymentStore::default()));
        let resp = router(state)
            .oneshot(webhook_request(b"{\"action\":1}".to_vec(), ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_degraded_without_database() {
        let state = test_state("", Arc::new(MemoryDeploymentStore::default()));
        let resp = router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["database"]["connected"], false);
    }
}
