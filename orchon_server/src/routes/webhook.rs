//! GitHub webhook handler: receives workflow_run events, records deployments.

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};

use crate::models::workflow_run::WorkflowRunPayload;
use crate::routes::AppState;
use crate::services::{deployment_service, github_service};

/// Handle an incoming GitHub webhook payload.
pub async fn handle_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !github_service::validate_signature(&state.config.github_webhook_secret, &body, signature) {
        tracing::warn!("Webhook signature validation failed");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let event_type = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    match event_type {
        "workflow_run" => handle_workflow_run(state, &body).await,
        "ping" => {
            tracing::info!("Received GitHub ping webhook");
            Ok(StatusCode::OK)
        }
        _ => {
            tracing::debug!("Ignoring webhook event: {}", event_type);
            Ok(StatusCode::OK)
        }
    }
}

async fn handle_workflow_run(state: &AppState, body: &[u8]) -> Result<StatusCode, StatusCode> {
    let payload: WorkflowRunPayload = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("Malformed workflow_run payload: {e}");
        StatusCode::BAD_REQUEST
    })?;

    let store = state.deployments.as_ref();
    if let Some(deployment) =
        deployment_service::handle_workflow_run(&state.catalog, store, &payload).await
    {
        state.publish(deployment);
    }

    Ok(StatusCode::OK)
}
