//! Orchon: infrastructure observatory.
//!
//! Tracks CI runs and the deploys that follow them, discovers the services
//! each project depends on, and reports combined CI and backend status for
//! a curated set of repositories.

mod catalog;
mod config;
mod dashboard;
mod db;
mod discovery;
mod events;
mod metrics;
mod migrations;
mod models;
mod routes;
mod schema;
mod seeder;
mod services;
#[cfg(test)]
mod test_db;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "orchon", about = "Infrastructure observatory")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "ORCHON_PORT", default_value = "9090")]
    port: u16,

    /// PostgreSQL connection URL. Without it the server runs without storage.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Catalog file (TOML). Defaults to the embedded catalog.
    #[arg(long, env = "ORCHON_CATALOG")]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();

    tracing::info!("Starting Orchon...");

    let catalog = catalog::Catalog::load(cli.catalog.as_deref())?;
    tracing::info!(
        owners = catalog.owners.len(),
        projects = catalog.projects.len(),
        "Catalog loaded"
    );
    let config = config::OrchonConfig::from_env(&catalog);

    let db = db::Database::new(cli.database_url, config.db_max_connections);
    if db.is_configured() {
        db.connect().await;
        prepare_database(&db, &catalog).await;
    } else {
        tracing::warn!("DATABASE_URL not set -- deployments and checks will not be stored");
    }

    metrics::init_metrics();

    let state = routes::AppState::new(db.clone(), config, catalog);
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("Orchon listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Create tables and seed catalog rows. Failures leave the server running.
async fn prepare_database(db: &db::Database, catalog: &catalog::Catalog) {
    let mut conn = match db.conn().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("Skipping migration, database not reachable: {e}");
            return;
        }
    };

    tracing::info!("Running database migration...");
    if let Err(e) = migrations::run_migration(&mut conn).await {
        tracing::error!("Database migration failed: {e:#}");
        return;
    }
    tracing::info!("Database migration completed.");

    if let Err(e) = seeder::seed_catalog(&mut conn, catalog).await {
        tracing::error!("Catalog seeding failed: {e:#}");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
