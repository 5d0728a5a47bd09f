//! status_checks + uptime_checks: health observations per service.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text, Timestamptz, Varchar};
use serde::{Deserialize, Serialize};

use crate::schema::{status_checks, uptime_checks};

/// Latest health of a project, derived from its services' status checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, QueryableByName)]
pub struct ProjectStatus {
    #[diesel(sql_type = Varchar)]
    pub project_id: String,
    #[diesel(sql_type = Varchar)]
    pub status: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub message: Option<String>,
    #[diesel(sql_type = Timestamptz)]
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = status_checks)]
pub struct StatusCheck {
    pub id: i64,
    pub service_id: String,
    pub status: String,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = status_checks)]
pub struct NewStatusCheck {
    pub service_id: String,
    pub status: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = uptime_checks)]
pub struct UptimeCheck {
    pub id: i64,
    pub service_id: String,
    pub url: Option<String>,
    pub response_time_ms: Option<i32>,
    pub status_code: Option<i32>,
    pub is_up: bool,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = uptime_checks)]
pub struct NewUptimeCheck {
    pub service_id: String,
    pub url: Option<String>,
    pub response_time_ms: Option<i32>,
    pub status_code: Option<i32>,
    pub is_up: bool,
    pub error_message: Option<String>,
}
