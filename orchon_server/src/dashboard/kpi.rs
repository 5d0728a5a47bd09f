//! KPI queries over tracked deployments.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Nullable, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;

/// Deployment success rate over N days (finished runs only).
#[derive(Debug, Serialize, QueryableByName)]
pub struct DeploymentSuccessRate {
    #[diesel(sql_type = BigInt)]
    pub total: i64,
    #[diesel(sql_type = BigInt)]
    pub success: i64,
    #[diesel(sql_type = Double)]
    pub rate: f64,
}

pub async fn query_success_rate(
    conn: &mut AsyncPgConnection,
    days: i32,
) -> anyhow::Result<DeploymentSuccessRate> {
    let result = diesel::sql_query(format!(
        "SELECT \
            COUNT(*) AS total, \
            COUNT(*) FILTER (WHERE status = 'success') AS success, \
            COALESCE( \
                COUNT(*) FILTER (WHERE status = 'success')::float / NULLIF(COUNT(*), 0), 0 \
            ) AS rate \
         FROM deployments \
         WHERE created_at >= NOW() - INTERVAL '{days} days' \
           AND status IN ('success', 'failure')"
    ))
    .get_result(conn)
    .await?;
    Ok(result)
}

/// Average time spent in each phase, in milliseconds.
///
/// Each average only covers deployments where both ends of the phase
/// are recorded.
#[derive(Debug, Serialize, QueryableByName)]
pub struct PhaseDurations {
    #[diesel(sql_type = Nullable<Double>)]
    pub queue_ms: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub ci_ms: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub handoff_ms: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub deploy_ms: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub lead_time_ms: Option<f64>,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

pub async fn query_phase_durations(
    conn: &mut AsyncPgConnection,
    days: i32,
) -> anyhow::Result<PhaseDurations> {
    let result = diesel::sql_query(format!(
        "SELECT \
            AVG(EXTRACT(EPOCH FROM (ci_started_at - pushed_at)) * 1000)::float AS queue_ms, \
            AVG(EXTRACT(EPOCH FROM (ci_completed_at - ci_started_at)) * 1000)::float AS ci_ms, \
            AVG(EXTRACT(EPOCH FROM (deploy_started_at - ci_completed_at)) * 1000)::float \
                AS handoff_ms, \
            AVG(EXTRACT(EPOCH FROM (deploy_completed_at - deploy_started_at)) * 1000)::float \
                AS deploy_ms, \
            AVG(EXTRACT(EPOCH FROM ( \
                COALESCE(deploy_completed_at, ci_completed_at) - pushed_at \
            )) * 1000)::float AS lead_time_ms, \
            COUNT(*) AS count \
         FROM deployments \
         WHERE created_at >= NOW() - INTERVAL '{days} days'"
    ))
    .get_result(conn)
    .await?;
    Ok(result)
}

/// Deployment count grouped by status.
#[derive(Debug, Serialize, QueryableByName)]
pub struct DeploymentsByStatus {
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

pub async fn query_deployments_by_status(
    conn: &mut AsyncPgConnection,
    days: i32,
) -> anyhow::Result<Vec<DeploymentsByStatus>> {
    let results = diesel::sql_query(format!(
        "SELECT status, COUNT(*) AS count \
         FROM deployments \
         WHERE created_at >= NOW() - INTERVAL '{days} days' \
         GROUP BY status \
         ORDER BY count DESC"
    ))
    .load(conn)
    .await?;
    Ok(results)
}
