//! Workflow run lifecycle events mapped onto deployment writes.
//!
//! Each action supplies a status and at most one phase timestamp. The
//! upsert in `deployment_service` replaces status and keeps the first value
//! written for every timestamp.

use crate::models::deployment::{DeploymentPhases, DeploymentRecord, DeploymentStatus};
use crate::models::workflow_run::{WorkflowRunAction, WorkflowRunPayload};

/// Status and newly supplied phase timestamp for a workflow run action.
pub fn phase_for_action(payload: &WorkflowRunPayload) -> (DeploymentStatus, DeploymentPhases) {
    let run = &payload.workflow_run;
    match payload.action {
        WorkflowRunAction::Requested => (
            DeploymentStatus::Queued,
            DeploymentPhases {
                pushed_at: Some(run.created_at),
                ..Default::default()
            },
        ),
        WorkflowRunAction::InProgress => (
            DeploymentStatus::InProgress,
            DeploymentPhases {
                ci_started_at: Some(run.updated_at),
                ..Default::default()
            },
        ),
        WorkflowRunAction::Completed => {
            let status = if run.conclusion.as_deref() == Some("success") {
                DeploymentStatus::Success
            } else {
                DeploymentStatus::Failure
            };
            (
                status,
                DeploymentPhases {
                    ci_completed_at: Some(run.updated_at),
                    ..Default::default()
                },
            )
        }
        WorkflowRunAction::Other => (DeploymentStatus::Queued, DeploymentPhases::default()),
    }
}

/// Build the upsert for a GitHub workflow run against `service_id`.
pub fn record_from_workflow_run(
    service_id: &str,
    payload: &WorkflowRunPayload,
) -> DeploymentRecord {
    let run = &payload.workflow_run;
    let (status, phases) = phase_for_action(payload);

    DeploymentRecord {
        id: format!("gh-{}", run.id),
        service_id: service_id.to_string(),
        provider: "github".to_string(),
        status,
        commit_sha: run.head_sha.clone(),
        branch: run.head_branch.clone(),
        run_url: run.html_url.clone(),
        started_at: Some(run.created_at),
        completed_at: (payload.action == WorkflowRunAction::Completed).then_some(run.updated_at),
        phases,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn payload(action: &str, conclusion: Option<&str>, updated_at: &str) -> WorkflowRunPayload {
        serde_json::from_value(serde_json::json!({
            "action": action,
            "workflow_run": {
                "id": 42,
                "name": "Deploy",
                "status": "completed",
                "conclusion": conclusion,
                "html_url": "https://github.com/acme/web/actions/runs/42",
                "head_sha": "abc123",
                "head_branch": "main",
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": updated_at,
            },
            "repository": { "name": "web", "owner": { "login": "acme" } }
        }))
        .unwrap()
    }

    #[test]
    fn requested_sets_pushed_at_only() {
        let record = record_from_workflow_run(
            "web-github-ci",
            &payload("requested", None, "2024-01-01T00:00:00Z"),
        );
        assert_eq!(record.id, "gh-42");
        assert_eq!(record.status, DeploymentStatus::Queued);
        assert_eq!(record.phases.pushed_at, Some(ts("2024-01-01T00:00:00Z")));
        assert_eq!(record.phases.ci_started_at, None);
        assert_eq!(record.completed_at, None);
    }

    #[test]
    fn completed_maps_conclusion() {
        let ok = record_from_workflow_run(
            "s",
            &payload("completed", Some("success"), "2024-01-01T00:05:00Z"),
        );
        assert_eq!(ok.status, DeploymentStatus::Success);
        assert_eq!(ok.phases.ci_completed_at, Some(ts("2024-01-01T00:05:00Z")));
        assert_eq!(ok.completed_at, Some(ts("2024-01-01T00:05:00Z")));

        for conclusion in [Some("cancelled"), Some("timed_out"), None] {
            let failed = record_from_workflow_run(
                "s",
                &payload("completed", conclusion, "2024-01-01T00:05:00Z"),
            );
            assert_eq!(failed.status, DeploymentStatus::Failure);
        }
    }

    #[test]
    fn unknown_action_is_queued_without_phase() {
        let record =
            record_from_workflow_run("s", &payload("rerequested", None, "2024-01-01T00:01:00Z"));
        assert_eq!(record.status, DeploymentStatus::Queued);
        assert_eq!(record.phases, DeploymentPhases::default());
    }
}
