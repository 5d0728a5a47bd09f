//! Monthly cost entries.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::cost::{CostEntry, NewCostEntry};
use crate::schema::cost_entries;

/// All cost entries, newest month first.
pub async fn list_costs(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<CostEntry>> {
    let results = cost_entries::table
        .order((cost_entries::month.desc(), cost_entries::project_id.asc()))
        .select(CostEntry::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

/// `YYYY-MM` with a real month.
pub fn is_valid_month(month: &str) -> bool {
    match month.split_once('-') {
        Some((year, mm)) => {
            year.len() == 4
                && year.chars().all(|c| c.is_ascii_digit())
                && matches!(mm.parse::<u32>(), Ok(1..=12))
                && mm.len() == 2
        }
        None => false,
    }
}

pub async fn insert_cost(
    conn: &mut AsyncPgConnection,
    entry: NewCostEntry,
) -> anyhow::Result<CostEntry> {
    if !is_valid_month(&entry.month) {
        anyhow::bail!("invalid month {:?}, expected YYYY-MM", entry.month);
    }
    if entry.amount_cents < 0 {
        anyhow::bail!("amount_cents must not be negative");
    }

    let result = diesel::insert_into(cost_entries::table)
        .values(&entry)
        .returning(CostEntry::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!(
        project_id = %result.project_id,
        month = %result.month,
        amount_cents = result.amount_cents,
        "Cost recorded"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_format() {
        assert!(is_valid_month("2024-01"));
        assert!(is_valid_month("2024-12"));
        assert!(!is_valid_month("2024-13"));
        assert!(!is_valid_month("2024-1"));
        assert!(!is_valid_month("24-01"));
        assert!(!is_valid_month("January"));
    }
}
