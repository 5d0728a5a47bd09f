//! projects + services: catalog entries mirrored into the database.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{projects, services};

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = projects)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub alert_level: String,
    pub alert_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub repo_owner: String,
    pub repo_name: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = services)]
pub struct Service {
    pub id: String,
    pub project_id: String,
    pub category: String,
    pub provider: String,
    pub service_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = services)]
pub struct NewService {
    pub id: String,
    pub project_id: String,
    pub category: String,
    pub provider: String,
    pub service_name: String,
}
