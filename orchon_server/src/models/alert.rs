use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::alerts;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = alerts)]
pub struct Alert {
    pub id: i64,
    pub project_id: String,
    pub service_id: Option<String>,
    pub alert_type: String,
    pub message: String,
    pub channel: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = alerts)]
pub struct NewAlert {
    pub project_id: String,
    pub service_id: Option<String>,
    pub alert_type: String,
    pub message: String,
    pub channel: String,
}
