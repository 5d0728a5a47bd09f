//! Curated catalog of monitored owners, repos and projects.
//!
//! Loaded once at startup from TOML (embedded default or `--catalog` file)
//! and kept in declaration order.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::models::infra::{service_id, ServiceCategory};

const DEFAULT_CATALOG: &str = include_str!("../catalog.toml");

/// How a project reaches production.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployMechanism {
    /// A GitHub Actions workflow deploys; CI completion means deployed.
    GithubActions,
    /// The hosting platform builds from git on its own.
    External,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub login: String,
    /// Environment variable holding the owner's GitHub token.
    pub token_env: String,
    #[serde(default)]
    pub repos: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogService {
    pub category: ServiceCategory,
    pub provider: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogProject {
    pub id: String,
    pub display_name: String,
    pub owner: String,
    pub repo: String,
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub deploy_mechanism: DeployMechanism,
    #[serde(default)]
    pub services: Vec<CatalogService>,
}

impl CatalogProject {
    pub fn service_id(&self, service: &CatalogService) -> String {
        service_id(&self.id, &service.provider, service.category)
    }

    /// The GitHub Actions service deployments are recorded against.
    pub fn ci_service(&self) -> Option<&CatalogService> {
        self.services
            .iter()
            .find(|s| s.category == ServiceCategory::Ci && s.provider == "github")
    }

    pub fn service_by_category(&self, category: ServiceCategory) -> Option<&CatalogService> {
        self.services.iter().find(|s| s.category == category)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub owners: Vec<Owner>,
    #[serde(default)]
    pub projects: Vec<CatalogProject>,
}

impl Catalog {
    /// Load from `path`, or the embedded default when none is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading catalog {}", path.display()))?;
                Self::from_toml_str(&content)
                    .with_context(|| format!("parsing catalog {}", path.display()))
            }
            None => Self::from_toml_str(DEFAULT_CATALOG).context("parsing embedded catalog"),
        }
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let catalog: Catalog = toml::from_str(content)?;

        let mut seen = std::collections::HashSet::new();
        for project in &catalog.projects {
            if !seen.insert(project.id.as_str()) {
                anyhow::bail!("duplicate project id in catalog: {}", project.id);
            }
        }

        Ok(catalog)
    }

    pub fn project(&self, id: &str) -> Option<&CatalogProject> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Find the project for a GitHub repository. Names compare case-insensitively.
    pub fn project_by_repo(&self, owner: &str, repo: &str) -> Option<&CatalogProject> {
        self.projects
            .iter()
            .find(|p| p.owner.eq_ignore_ascii_case(owner) && p.repo.eq_ignore_ascii_case(repo))
    }

    pub fn project_for_service(&self, service_id: &str) -> Option<&CatalogProject> {
        self.projects
            .iter()
            .find(|p| p.services.iter().any(|s| p.service_id(s) == service_id))
    }

    /// True when `owner` lists `name` among its repos.
    pub fn is_listed_repo(&self, owner: &str, name: &str) -> bool {
        self.owners
            .iter()
            .filter(|o| o.login.eq_ignore_ascii_case(owner))
            .flat_map(|o| o.repos.iter())
            .any(|r| r.eq_ignore_ascii_case(name))
    }
}
