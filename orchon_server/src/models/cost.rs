//! cost_entries: monthly spend per project and provider.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::cost_entries;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = cost_entries)]
pub struct CostEntry {
    pub project_id: String,
    /// `YYYY-MM`
    pub month: String,
    pub amount_cents: i64,
    pub provider: String,
    pub notes: Option<String>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = cost_entries)]
pub struct NewCostEntry {
    pub project_id: String,
    pub month: String,
    pub amount_cents: i64,
    pub provider: String,
    pub notes: Option<String>,
}
