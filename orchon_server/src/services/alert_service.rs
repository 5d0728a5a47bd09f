//! Alert log. Projects opt out with `alert_level = 'none'`.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::alert::{Alert, NewAlert};
use crate::schema::{alerts, projects};

/// Record an alert unless the project has alerts switched off.
///
/// Returns `None` when suppressed; errors when the project is unknown.
pub async fn record_alert(
    conn: &mut AsyncPgConnection,
    alert: NewAlert,
) -> anyhow::Result<Option<Alert>> {
    let level: Option<String> = projects::table
        .find(&alert.project_id)
        .select(projects::alert_level)
        .first(conn)
        .await
        .optional()?;

    let Some(level) = level else {
        anyhow::bail!("unknown project: {}", alert.project_id);
    };
    if level == "none" {
        tracing::debug!(project_id = %alert.project_id, "Alerts disabled, not recording");
        return Ok(None);
    }

    let result = diesel::insert_into(alerts::table)
        .values(&alert)
        .returning(Alert::as_returning())
        .get_result(conn)
        .await?;

    tracing::warn!(
        project_id = %result.project_id,
        alert_type = %result.alert_type,
        channel = %result.channel,
        "Alert recorded"
    );
    Ok(Some(result))
}
