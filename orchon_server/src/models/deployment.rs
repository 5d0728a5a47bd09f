//! deployments: one CI run and the deploy that followed it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::deployments;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Queued,
    InProgress,
    Success,
    Failure,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(anyhow::anyhow!("unknown deployment status: {other}")),
        }
    }
}

/// The five lifecycle timestamps. Filled forward, never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPhases {
    pub pushed_at: Option<DateTime<Utc>>,
    pub ci_started_at: Option<DateTime<Utc>>,
    pub ci_completed_at: Option<DateTime<Utc>>,
    pub deploy_started_at: Option<DateTime<Utc>>,
    pub deploy_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, QueryableByName, Selectable, Serialize, Deserialize)]
#[diesel(table_name = deployments)]
pub struct Deployment {
    pub id: String,
    pub service_id: String,
    pub provider: String,
    pub status: String,
    pub commit_sha: Option<String>,
    pub branch: Option<String>,
    pub run_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub ci_started_at: Option<DateTime<Utc>>,
    pub ci_completed_at: Option<DateTime<Utc>>,
    pub deploy_started_at: Option<DateTime<Utc>>,
    pub deploy_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Deployment {
    pub fn phases(&self) -> DeploymentPhases {
        DeploymentPhases {
            pushed_at: self.pushed_at,
            ci_started_at: self.ci_started_at,
            ci_completed_at: self.ci_completed_at,
            deploy_started_at: self.deploy_started_at,
            deploy_completed_at: self.deploy_completed_at,
        }
    }
}

/// One computed write against the deployments table, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub service_id: String,
    pub provider: String,
    pub status: DeploymentStatus,
    pub commit_sha: Option<String>,
    pub branch: Option<String>,
    pub run_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub phases: DeploymentPhases,
}

/// A deploy reported by the hosting side, correlated by commit SHA.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployUpdate {
    pub deploy_started_at: Option<DateTime<Utc>>,
    pub deploy_completed_at: Option<DateTime<Utc>>,
    pub status: Option<DeploymentStatus>,
}

/// Deployment as broadcast to live listeners and returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDeployment {
    pub id: String,
    pub project_id: String,
    pub service_id: String,
    pub provider: String,
    pub status: DeploymentStatus,
    pub workflow_name: Option<String>,
    pub commit_sha: Option<String>,
    pub branch: Option<String>,
    pub run_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub phases: DeploymentPhases,
}

impl ProcessedDeployment {
    pub fn from_record(
        project_id: &str,
        record: &DeploymentRecord,
        workflow_name: Option<String>,
    ) -> Self {
        Self {
            id: record.id.clone(),
            project_id: project_id.to_string(),
            service_id: record.service_id.clone(),
            provider: record.provider.clone(),
            status: record.status,
            workflow_name,
            commit_sha: record.commit_sha.clone(),
            branch: record.branch.clone(),
            run_url: record.run_url.clone(),
            started_at: record.started_at,
            completed_at: record.completed_at,
            phases: record.phases.clone(),
        }
    }

    pub fn from_row(project_id: &str, row: &Deployment) -> anyhow::Result<Self> {
        Ok(Self {
            id: row.id.clone(),
            project_id: project_id.to_string(),
            service_id: row.service_id.clone(),
            provider: row.provider.clone(),
            status: row.status.parse()?,
            workflow_name: None,
            commit_sha: row.commit_sha.clone(),
            branch: row.branch.clone(),
            run_url: row.run_url.clone(),
            started_at: row.started_at,
            completed_at: row.completed_at,
            phases: row.phases(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            DeploymentStatus::Queued,
            DeploymentStatus::InProgress,
            DeploymentStatus::Success,
            DeploymentStatus::Failure,
        ] {
            assert_eq!(status.as_str().parse::<DeploymentStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<DeploymentStatus>().is_err());
    }

    #[test]
    fn processed_deployment_flattens_phases() {
        let json = serde_json::to_value(ProcessedDeployment {
            id: "gh-1".into(),
            project_id: "web".into(),
            service_id: "web-github-ci".into(),
            provider: "github".into(),
            status: DeploymentStatus::InProgress,
            workflow_name: None,
            commit_sha: None,
            branch: None,
            run_url: None,
            started_at: None,
            completed_at: None,
            phases: DeploymentPhases {
                ci_started_at: Some(ts("2024-01-01T00:01:00Z")),
                ..Default::default()
            },
        })
        .unwrap();

        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["ci_started_at"], "2024-01-01T00:01:00Z");
        assert!(json["pushed_at"].is_null());
    }
}
