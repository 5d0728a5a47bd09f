//! Diesel table definitions for the observatory.
//!
//! Tables: projects, services, deployments, status_checks, uptime_checks,
//! cost_entries, alerts. Projects and services are keyed by catalog ids
//! (text); deployments by the provider-derived id (`gh-<run id>`).

diesel::table! {
    projects (id) {
        id -> Varchar,
        name -> Varchar,
        display_name -> Varchar,
        repo_owner -> Varchar,
        repo_name -> Varchar,
        alert_level -> Varchar,
        alert_email -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    services (id) {
        id -> Varchar,
        project_id -> Varchar,
        category -> Varchar,
        provider -> Varchar,
        service_name -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    deployments (id) {
        id -> Varchar,
        service_id -> Varchar,
        provider -> Varchar,
        status -> Varchar,
        commit_sha -> Nullable<Varchar>,
        branch -> Nullable<Varchar>,
        run_url -> Nullable<Varchar>,
        started_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        pushed_at -> Nullable<Timestamptz>,
        ci_started_at -> Nullable<Timestamptz>,
        ci_completed_at -> Nullable<Timestamptz>,
        deploy_started_at -> Nullable<Timestamptz>,
        deploy_completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    status_checks (id) {
        id -> Int8,
        service_id -> Varchar,
        status -> Varchar,
        message -> Nullable<Text>,
        checked_at -> Timestamptz,
    }
}

diesel::table! {
    uptime_checks (id) {
        id -> Int8,
        service_id -> Varchar,
        url -> Nullable<Varchar>,
        response_time_ms -> Nullable<Int4>,
        status_code -> Nullable<Int4>,
        is_up -> Bool,
        error_message -> Nullable<Text>,
        checked_at -> Timestamptz,
    }
}

diesel::table! {
    cost_entries (id) {
        id -> Int8,
        project_id -> Varchar,
        month -> Varchar,
        amount_cents -> Int8,
        provider -> Varchar,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    alerts (id) {
        id -> Int8,
        project_id -> Varchar,
        service_id -> Nullable<Varchar>,
        alert_type -> Varchar,
        message -> Text,
        channel -> Varchar,
        created_at -> Timestamptz,
    }
}

// Foreign key relationships
diesel::joinable!(services -> projects (project_id));
diesel::joinable!(deployments -> services (service_id));
diesel::joinable!(status_checks -> services (service_id));
diesel::joinable!(uptime_checks -> services (service_id));
diesel::joinable!(cost_entries -> projects (project_id));
diesel::joinable!(alerts -> projects (project_id));

diesel::allow_tables_to_appear_in_same_query!(
    projects,
    services,
    deployments,
    status_checks,
    uptime_checks,
    cost_entries,
    alerts,
);
