//! Database handle: an owned deadpool of async Postgres connections that
//! rebuilds itself when the server is unreachable.
//!
//! Every caller gets the pool through [`Database::ensure`]. A dead pool is
//! dropped and rebuilt with a bounded retry; only one task rebuilds at a
//! time, others fail fast with [`DbError::Unavailable`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deadpool::managed::BuildError;
use deadpool::Runtime;
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use tokio::sync::RwLock;

pub type PgPool = Pool<AsyncPgConnection>;
pub type PgConn = Object<AsyncPgConnection>;

const CONNECT_ATTEMPTS: u32 = 3;
/// Longest a request waits for a pooled connection, or for a new one to open.
const POOL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("DATABASE_URL not set")]
    NotConfigured,
    #[error("database unavailable")]
    Unavailable,
    #[error("database pool: {0}")]
    Pool(String),
}

#[derive(Debug, Serialize)]
pub struct DbStatus {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    url: Option<String>,
    max_connections: usize,
    pool: RwLock<Option<PgPool>>,
    reconnecting: AtomicBool,
}

/// Clears the reconnect flag however the rebuild ends.
struct ReconnectGuard<'a>(&'a AtomicBool);

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Delay before retry `attempt` (1-based): 1s, 2s, 4s, capped at 5s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let ms = 1000u64.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    Duration::from_millis(ms.min(5000))
}

impl Database {
    /// Create a handle. Nothing connects until [`Database::connect`] or first use.
    pub fn new(url: Option<String>, max_connections: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                url,
                max_connections,
                pool: RwLock::new(None),
                reconnecting: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.url.is_some()
    }

    /// Initial connection at startup. Failure leaves the handle degraded.
    pub async fn connect(&self) {
        if self.ensure().await.is_err() {
            tracing::warn!("Running in degraded mode -- will attempt reconnection on requests");
        }
    }

    /// A live pool, rebuilding it if needed.
    pub async fn ensure(&self) -> Result<PgPool, DbError> {
        let current = self.inner.pool.read().await.clone();
        if let Some(pool) = current {
            match ping(&pool).await {
                Ok(()) => return Ok(pool),
                Err(e) => {
                    tracing::error!("Database connection lost, attempting reconnect: {e}");
                    let mut slot = self.inner.pool.write().await;
                    if let Some(dead) = slot.take() {
                        dead.close();
                    }
                }
            }
        }

        let url = self.inner.url.as_deref().ok_or(DbError::NotConfigured)?;

        if self
            .inner
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DbError::Unavailable);
        }
        let _guard = ReconnectGuard(&self.inner.reconnecting);

        tracing::info!("Attempting database connection...");
        let pool = create_pool(url, self.inner.max_connections)
            .await
            .ok_or(DbError::Unavailable)?;
        *self.inner.pool.write().await = Some(pool.clone());
        Ok(pool)
    }

    /// Check out one connection.
    pub async fn conn(&self) -> Result<PgConn, DbError> {
        let pool = self.ensure().await?;
        pool.get().await.map_err(|e| DbError::Pool(e.to_string()))
    }

    pub async fn status(&self) -> DbStatus {
        let pool = match self.ensure().await {
            Ok(pool) => pool,
            Err(_) => {
                return DbStatus {
                    connected: false,
                    latency_ms: None,
                }
            }
        };

        let start = Instant::now();
        match ping(&pool).await {
            Ok(()) => DbStatus {
                connected: true,
                latency_ms: Some(start.elapsed().as_millis() as u64),
            },
            Err(_) => DbStatus {
                connected: false,
                latency_ms: None,
            },
        }
    }

    pub async fn close(&self) {
        if let Some(pool) = self.inner.pool.write().await.take() {
            pool.close();
        }
    }
}

async fn ping(pool: &PgPool) -> anyhow::Result<()> {
    let mut conn = pool.get().await?;
    diesel::sql_query("SELECT 1").execute(&mut *conn).await?;
    Ok(())
}

fn build_pool(url: &str, max_connections: usize) -> Result<PgPool, BuildError> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);
    Pool::builder(manager)
        .max_size(max_connections)
        .wait_timeout(Some(POOL_TIMEOUT))
        .create_timeout(Some(POOL_TIMEOUT))
        .runtime(Runtime::Tokio1)
        .build()
}

async fn create_pool(url: &str, max_connections: usize) -> Option<PgPool> {
    for attempt in 1..=CONNECT_ATTEMPTS {
        let pool = match build_pool(url, max_connections) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!("Failed to build database pool: {e}");
                return None;
            }
        };

        match ping(&pool).await {
            Ok(()) => {
                tracing::info!("Database connected successfully");
                return Some(pool);
            }
            Err(e) => {
                tracing::error!(
                    attempt,
                    max_attempts = CONNECT_ATTEMPTS,
                    "Database connection attempt failed: {e}"
                );
                pool.close();
                if attempt == CONNECT_ATTEMPTS {
                    tracing::warn!("Database unavailable after retries");
                    return None;
                }
                let delay = backoff_delay(attempt);
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    "Retrying database connection"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    None
}
