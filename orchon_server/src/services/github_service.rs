//! GitHub integration: webhook validation, workflow runs, repo metadata.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::catalog::DeployMechanism;

type HmacSha256 = Hmac<Sha256>;

const USER_AGENT: &str = "orchon";

/// Validate a GitHub webhook signature (X-Hub-Signature-256).
pub fn validate_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        tracing::warn!("Webhook secret not configured, skipping validation");
        return true;
    }

    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    let sig_bytes = match hex::decode(sig) {
        Ok(b) => b,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// Latest run of any workflow in a repository.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LatestRun {
    pub name: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
    pub head_sha: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LatestRun {
    /// Collapse GitHub's status/conclusion pair into success, failure,
    /// in_progress or unknown.
    pub fn ci_status(&self) -> &'static str {
        match (self.status.as_deref(), self.conclusion.as_deref()) {
            (Some("completed"), Some("success")) => "success",
            (Some("completed"), _) => "failure",
            (Some("in_progress" | "queued" | "requested" | "waiting" | "pending"), _) => {
                "in_progress"
            }
            _ => "unknown",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunList {
    #[serde(default)]
    workflow_runs: Vec<LatestRun>,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    pushed_at: Option<DateTime<Utc>>,
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
}

/// Repository facts used to infer how a project deploys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoInfo {
    pub last_push: Option<DateTime<Utc>>,
    pub default_branch: Option<String>,
    pub has_github_actions: bool,
    pub workflow_files: Vec<String>,
    pub deploy_mechanism: DeployMechanism,
}

/// `github-actions` when a workflow file looks like it ships something.
pub fn deploy_mechanism_for(workflow_files: &[String]) -> DeployMechanism {
    let ships = workflow_files.iter().any(|f| {
        let f = f.to_lowercase();
        f.contains("deploy") || f.contains("release") || f.contains("publish")
    });
    if ships {
        DeployMechanism::GithubActions
    } else {
        DeployMechanism::External
    }
}

/// Thin GitHub REST client. The token is supplied per call since each
/// owner has its own.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GithubClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.get_as(path, token, "application/vnd.github+json")
    }

    fn get_as(&self, path: &str, token: &str, accept: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", accept)
            .header("User-Agent", USER_AGENT)
    }

    /// Most recent workflow run, or `None` when the repo has none.
    pub async fn latest_workflow_run(
        &self,
        owner: &str,
        repo: &str,
        token: &str,
    ) -> anyhow::Result<Option<LatestRun>> {
        let resp = self
            .get(&format!("/repos/{owner}/{repo}/actions/runs?per_page=1"), token)
            .send()
            .await?
            .error_for_status()?;
        let list: RunList = resp.json().await?;
        Ok(list.workflow_runs.into_iter().next())
    }

    /// Raw `package.json` from the default branch, `None` when absent.
    pub async fn package_json(
        &self,
        owner: &str,
        repo: &str,
        token: &str,
    ) -> anyhow::Result<Option<serde_json::Value>> {
        let resp = self
            .get_as(
                &format!("/repos/{owner}/{repo}/contents/package.json"),
                token,
                "application/vnd.github.raw+json",
            )
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value = resp.error_for_status()?.json().await?;
        Ok(Some(value))
    }

    /// The `version` field of the repo's package.json.
    pub async fn package_version(
        &self,
        owner: &str,
        repo: &str,
        token: &str,
    ) -> anyhow::Result<Option<String>> {
        let pkg = self.package_json(owner, repo, token).await?;
        Ok(pkg.and_then(|p| p.get("version")?.as_str().map(str::to_string)))
    }

    /// Last push, default branch and workflow files. A missing workflows
    /// directory means the platform deploys on its own.
    pub async fn repo_info(
        &self,
        owner: &str,
        repo: &str,
        token: &str,
    ) -> anyhow::Result<RepoInfo> {
        let meta: RepoResponse = self
            .get(&format!("/repos/{owner}/{repo}"), token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let resp = self
            .get(&format!("/repos/{owner}/{repo}/contents/.github/workflows"), token)
            .send()
            .await?;
        let workflow_files: Vec<String> = if resp.status().is_success() {
            let entries: Vec<ContentEntry> = resp.json().await?;
            entries
                .into_iter()
                .map(|e| e.name)
                .filter(|n| n.ends_with(".yml") || n.ends_with(".yaml"))
                .collect()
        } else {
            Vec::new()
        };

        Ok(RepoInfo {
            last_push: meta.pushed_at,
            default_branch: meta.default_branch,
            has_github_actions: !workflow_files.is_empty(),
            deploy_mechanism: deploy_mechanism_for(&workflow_files),
            workflow_files,
        })
    }
}
