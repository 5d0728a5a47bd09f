//! Catalog seeder: mirrors catalog projects and services into the
//! `projects` / `services` tables so deployments and checks can reference
//! them.
//!
//! Idempotent: uses ON CONFLICT DO NOTHING. Rows already present keep
//! their stored values (alert settings are edited in the database).

use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::catalog::Catalog;
use crate::models::project::{NewProject, NewService};
use crate::schema::{projects, services};

pub fn catalog_rows(catalog: &Catalog) -> (Vec<NewProject>, Vec<NewService>) {
    let mut new_projects = Vec::new();
    let mut new_services = Vec::new();

    for project in &catalog.projects {
        new_projects.push(NewProject {
            id: project.id.clone(),
            name: project.repo.clone(),
            display_name: project.display_name.clone(),
            repo_owner: project.owner.clone(),
            repo_name: project.repo.clone(),
        });

        for service in &project.services {
            new_services.push(NewService {
                id: project.service_id(service),
                project_id: project.id.clone(),
                category: service.category.as_str().to_string(),
                provider: service.provider.clone(),
                service_name: service.name.clone(),
            });
        }
    }

    (new_projects, new_services)
}

pub async fn seed_catalog(conn: &mut AsyncPgConnection, catalog: &Catalog) -> anyhow::Result<()> {
    let (new_projects, new_services) = catalog_rows(catalog);

    let inserted_projects = diesel::insert_into(projects::table)
        .values(&new_projects)
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;

    let inserted_services = diesel::insert_into(services::table)
        .values(&new_services)
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;

    tracing::info!(
        projects = new_projects.len(),
        services = new_services.len(),
        inserted_projects,
        inserted_services,
        "Catalog seeded"
    );
    Ok(())
}
