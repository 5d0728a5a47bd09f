//! Status aggregation: latest GitHub Actions run per repository merged with
//! backend health from status checks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::catalog::{Catalog, CatalogProject, DeployMechanism};
use crate::config::OrchonConfig;
use crate::models::check::ProjectStatus;
use crate::models::infra::ServiceCategory;
use crate::services::github_service::GithubClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Success,
    Failure,
    Deploying,
    Unknown,
}

/// healthy → success, degraded|deploying → deploying,
/// down|unhealthy → failure, anything else → unknown.
pub fn map_backend_status(status: Option<&str>) -> DeployStatus {
    match status {
        Some("healthy") => DeployStatus::Success,
        Some("degraded" | "deploying") => DeployStatus::Deploying,
        Some("down" | "unhealthy") => DeployStatus::Failure,
        _ => DeployStatus::Unknown,
    }
}

/// What GitHub says about a repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GitStatus {
    /// success, failure, in_progress or unknown.
    pub ci_status: String,
    pub conclusion: Option<String>,
    pub html_url: String,
    pub workflow_name: Option<String>,
    pub run_date: Option<DateTime<Utc>>,
    pub version: Option<String>,
    pub last_commit_sha: Option<String>,
}

impl GitStatus {
    pub fn unknown(owner: &str, repo: &str) -> Self {
        Self {
            ci_status: "unknown".to_string(),
            conclusion: None,
            html_url: format!("https://github.com/{owner}/{repo}/actions"),
            workflow_name: None,
            run_date: None,
            version: None,
            last_commit_sha: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoStatus {
    pub owner: String,
    pub repo: String,
    pub project_id: Option<String>,
    pub deploy_status: DeployStatus,
    pub deploy_platform: String,
    pub deployed_at: Option<DateTime<Utc>>,
    pub repo_url: String,
    #[serde(flatten)]
    pub git: GitStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub statuses: Vec<RepoStatus>,
    pub last_updated: DateTime<Utc>,
}

/// Deploy status and time: backend health first, then CI for projects
/// that deploy from GitHub Actions, otherwise unknown.
pub fn combine(
    project: Option<&CatalogProject>,
    backend: Option<&ProjectStatus>,
    git: &GitStatus,
) -> (DeployStatus, Option<DateTime<Utc>>) {
    if let Some(backend) = backend {
        return (map_backend_status(Some(&backend.status)), Some(backend.checked_at));
    }

    let mechanism = project.map(|p| p.deploy_mechanism).unwrap_or_default();
    if mechanism != DeployMechanism::GithubActions {
        return (DeployStatus::Unknown, None);
    }

    let status = match git.ci_status.as_str() {
        "success" => DeployStatus::Success,
        "failure" => DeployStatus::Failure,
        "in_progress" => DeployStatus::Deploying,
        _ => DeployStatus::Unknown,
    };
    (status, git.run_date)
}

/// Hosting platform label from the project's hosting service.
pub fn deploy_platform(project: Option<&CatalogProject>) -> &'static str {
    let provider = project
        .and_then(|p| p.service_by_category(ServiceCategory::Hosting))
        .map(|s| s.provider.as_str());
    match provider {
        Some("cloudflare") => "cloudflare",
        Some("flyio") => "flyio",
        Some("vercel") => "vercel",
        Some("netlify") => "netlify",
        Some("gcp" | "firebase") => "gcp",
        _ => "local",
    }
}

async fn fetch_git_status(
    github: &GithubClient,
    owner: &str,
    repo: &str,
    token: &str,
) -> GitStatus {
    let (run, version) = futures::join!(
        github.latest_workflow_run(owner, repo, token),
        github.package_version(owner, repo, token),
    );

    let mut status = GitStatus::unknown(owner, repo);
    match run {
        Ok(Some(run)) => {
            status.ci_status = run.ci_status().to_string();
            status.conclusion = run.conclusion;
            if let Some(url) = run.html_url {
                status.html_url = url;
            }
            status.workflow_name = run.name;
            status.run_date = run.updated_at;
            status.last_commit_sha = run.head_sha;
        }
        Ok(None) => {}
        Err(e) => {
            crate::metrics::upstream_error("github");
            tracing::warn!(owner, repo, "Failed to fetch latest workflow run: {e}");
        }
    }
    match version {
        Ok(v) => status.version = v,
        Err(e) => {
            crate::metrics::upstream_error("github");
            tracing::warn!(owner, repo, "Failed to fetch package version: {e}");
        }
    }
    status
}

fn repo_status(
    owner: &str,
    repo: &str,
    project: Option<&CatalogProject>,
    backend: Option<&ProjectStatus>,
    git: GitStatus,
) -> RepoStatus {
    let (deploy_status, deployed_at) = combine(project, backend, &git);
    RepoStatus {
        owner: owner.to_string(),
        repo: repo.to_string(),
        project_id: project.map(|p| p.id.clone()),
        deploy_status,
        deploy_platform: deploy_platform(project).to_string(),
        deployed_at,
        repo_url: format!("https://github.com/{owner}/{repo}"),
        git,
    }
}

/// Status of a project only the backend knows about (CI outside GitHub
/// repo lists, e.g. GCP Cloud Build).
fn backend_only_status(
    project: &CatalogProject,
    ci_provider: &str,
    backend: Option<&ProjectStatus>,
) -> RepoStatus {
    let backend_status = backend.map(|b| b.status.as_str());
    let is_gcp = ci_provider == "gcp";
    let platform = if is_gcp {
        "gcp"
    } else {
        deploy_platform(Some(project))
    };
    let console = format!(
        "https://console.cloud.google.com/cloud-build/builds?project={}",
        project.id
    );

    RepoStatus {
        owner: project.owner.clone(),
        repo: project.id.clone(),
        project_id: Some(project.id.clone()),
        deploy_status: map_backend_status(backend_status),
        deploy_platform: platform.to_string(),
        deployed_at: backend.map(|b| b.checked_at),
        repo_url: if is_gcp {
            console.clone()
        } else {
            format!("https://github.com/{}/{}", project.owner, project.repo)
        },
        git: GitStatus {
            ci_status: match backend_status {
                Some("healthy") => "success",
                Some("down") => "failure",
                _ => "unknown",
            }
            .to_string(),
            conclusion: backend_status.map(str::to_string),
            html_url: if is_gcp {
                console
            } else {
                format!("https://github.com/{}/{}/actions", project.owner, project.repo)
            },
            workflow_name: is_gcp.then(|| "GCP Cloud Build".to_string()),
            run_date: backend.map(|b| b.checked_at),
            version: None,
            last_commit_sha: None,
        },
    }
}

/// Build the status of every catalog repository.
///
/// Owners without a token report `unknown` CI for all their repos. Every
/// repo of every owner is fetched concurrently; a failed call degrades only
/// that repo.
pub async fn aggregate(
    catalog: &Catalog,
    config: &OrchonConfig,
    github: &GithubClient,
    backend: &HashMap<String, ProjectStatus>,
) -> StatusReport {
    let mut pending = Vec::new();
    for owner in &catalog.owners {
        let token = config.github_token(&owner.login);
        if token.is_none() {
            tracing::warn!(
                owner = %owner.login,
                env = %owner.token_env,
                "Missing GitHub token, CI status unknown"
            );
        }
        for repo in &owner.repos {
            pending.push(async move {
                let git = match token {
                    Some(token) => fetch_git_status(github, &owner.login, repo, token).await,
                    None => GitStatus::unknown(&owner.login, repo),
                };
                (owner, repo, git)
            });
        }
    }

    let mut statuses: Vec<RepoStatus> = join_all(pending)
        .await
        .into_iter()
        .map(|(owner, repo, git)| {
            let project = catalog.project_by_repo(&owner.login, repo);
            let backend = project.and_then(|p| backend.get(&p.id));
            repo_status(&owner.login, repo, project, backend, git)
        })
        .collect();

    for project in &catalog.projects {
        if catalog.is_listed_repo(&project.owner, &project.repo)
            || catalog.is_listed_repo(&project.owner, &project.id)
        {
            continue;
        }
        let Some(ci) = project.service_by_category(ServiceCategory::Ci) else {
            continue;
        };
        if ci.provider == "gcp" || ci.provider == "github" {
            let status = backend.get(&project.id);
            statuses.push(backend_only_status(project, &ci.provider, status));
        }
    }

    StatusReport {
        statuses,
        last_updated: Utc::now(),
    }
}
