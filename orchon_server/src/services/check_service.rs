//! Status and uptime checks.

use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::Varchar;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::check::{
    NewStatusCheck, NewUptimeCheck, ProjectStatus, StatusCheck, UptimeCheck,
};
use crate::schema::{services, status_checks, uptime_checks};

/// Record a status check for a service.
pub async fn insert_status_check(
    conn: &mut AsyncPgConnection,
    check: NewStatusCheck,
) -> anyhow::Result<StatusCheck> {
    let result = diesel::insert_into(status_checks::table)
        .values(&check)
        .returning(StatusCheck::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!(
        service_id = %result.service_id,
        status = %result.status,
        "Status check recorded"
    );
    Ok(result)
}

pub async fn insert_uptime_check(
    conn: &mut AsyncPgConnection,
    check: NewUptimeCheck,
) -> anyhow::Result<UptimeCheck> {
    let result = diesel::insert_into(uptime_checks::table)
        .values(&check)
        .returning(UptimeCheck::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}

/// Latest status of every project that has at least one check.
pub async fn latest_for_all_projects(
    conn: &mut AsyncPgConnection,
) -> anyhow::Result<Vec<ProjectStatus>> {
    let results = diesel::sql_query(
        "SELECT DISTINCT ON (s.project_id) \
            s.project_id, sc.status, sc.message, sc.checked_at \
         FROM status_checks sc \
         JOIN services s ON s.id = sc.service_id \
         ORDER BY s.project_id, sc.checked_at DESC",
    )
    .load(conn)
    .await?;
    Ok(results)
}

pub async fn latest_for_project(
    conn: &mut AsyncPgConnection,
    project_id: &str,
) -> anyhow::Result<Option<ProjectStatus>> {
    let result = diesel::sql_query(
        "SELECT s.project_id, sc.status, sc.message, sc.checked_at \
         FROM status_checks sc \
         JOIN services s ON s.id = sc.service_id \
         WHERE s.project_id = $1 \
         ORDER BY sc.checked_at DESC \
         LIMIT 1",
    )
    .bind::<Varchar, _>(project_id)
    .get_result(conn)
    .await
    .optional()?;
    Ok(result)
}

/// Status checks of a project over the last `hours`, newest first.
pub async fn status_history(
    conn: &mut AsyncPgConnection,
    project_id: &str,
    hours: i64,
) -> anyhow::Result<Vec<StatusCheck>> {
    let cutoff = Utc::now() - chrono::Duration::hours(hours);
    let results = status_checks::table
        .inner_join(services::table)
        .filter(services::project_id.eq(project_id))
        .filter(status_checks::checked_at.gt(cutoff))
        .order(status_checks::checked_at.desc())
        .select(StatusCheck::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

/// Uptime checks of a project over the last `hours`, newest first.
pub async fn uptime_history(
    conn: &mut AsyncPgConnection,
    project_id: &str,
    hours: i64,
) -> anyhow::Result<Vec<UptimeCheck>> {
    let cutoff = Utc::now() - chrono::Duration::hours(hours);
    let results = uptime_checks::table
        .inner_join(services::table)
        .filter(services::project_id.eq(project_id))
        .filter(uptime_checks::checked_at.gt(cutoff))
        .order(uptime_checks::checked_at.desc())
        .select(UptimeCheck::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::test_db::TestDatabase;

    const CATALOG: &str = r#"
[[owners]]
login = "acme"
token_env = "PAT_ACME"
repos = ["checked-web"]

[[projects]]
id = "checked-web"
display_name = "Checked Web"
owner = "acme"
repo = "checked-web"

[[projects.services]]
category = "hosting"
provider = "flyio"
name = "Fly.io"
"#;

    fn check(status: &str, message: Option<&str>) -> NewStatusCheck {
        NewStatusCheck {
            service_id: "checked-web-flyio-hosting".to_string(),
            status: status.to_string(),
            message: message.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn latest_for_project_returns_newest_check() {
        let catalog = Catalog::from_toml_str(CATALOG).unwrap();
        let Some(test_db) = TestDatabase::start(&catalog).await else {
            return;
        };
        let mut conn = test_db.db.conn().await.unwrap();

        assert!(latest_for_project(&mut conn, "never-checked")
            .await
            .unwrap()
            .is_none());

        insert_status_check(&mut conn, check("down", Some("502 from origin")))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let newest = insert_status_check(&mut conn, check("healthy", None))
            .await
            .unwrap();

        let latest = latest_for_project(&mut conn, "checked-web")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.project_id, "checked-web");
        assert_eq!(latest.status, "healthy");
        assert_eq!(latest.message, None);
        assert_eq!(latest.checked_at, newest.checked_at);

        let all = latest_for_all_projects(&mut conn).await.unwrap();
        let mine = all.iter().find(|s| s.project_id == "checked-web").unwrap();
        assert_eq!(mine, &latest);
    }
}
