//! Projects and their services, with current health.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;

use crate::models::check::ProjectStatus;
use crate::models::project::{Project, Service};
use crate::schema::{projects, services};
use crate::services::check_service;

#[derive(Debug, Serialize)]
pub struct ProjectOverview {
    #[serde(flatten)]
    pub project: Project,
    pub services: Vec<Service>,
    pub current_status: Option<ProjectStatus>,
}

/// Every project with its services and latest status check.
pub async fn list_projects(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<ProjectOverview>> {
    let all_projects: Vec<Project> = projects::table
        .order(projects::created_at.asc())
        .select(Project::as_select())
        .load(conn)
        .await?;

    let all_services: Vec<Service> = services::table
        .order(services::id.asc())
        .select(Service::as_select())
        .load(conn)
        .await?;

    let mut statuses: HashMap<String, ProjectStatus> = check_service::latest_for_all_projects(conn)
        .await?
        .into_iter()
        .map(|s| (s.project_id.clone(), s))
        .collect();

    let mut by_project: HashMap<String, Vec<Service>> = HashMap::new();
    for service in all_services {
        by_project.entry(service.project_id.clone()).or_default().push(service);
    }

    Ok(all_projects
        .into_iter()
        .map(|project| ProjectOverview {
            services: by_project.remove(&project.id).unwrap_or_default(),
            current_status: statuses.remove(&project.id),
            project,
        })
        .collect())
}

pub async fn get_project(
    conn: &mut AsyncPgConnection,
    project_id: &str,
) -> anyhow::Result<Option<Project>> {
    let result = projects::table
        .find(project_id)
        .select(Project::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(result)
}
