pub mod message_repo;
pub mod records;
pub mod user_repo;

use crate::config::StorageConfig;
use crate::error::Result;
use crate::storage::{Store, StoreHealth};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use std::time::Duration;

pub use message_repo::MessageRepository;
pub use user_repo::UserRepository;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool, retrying with exponential backoff.
///
/// # Errors
/// Returns `sqlx::Error` once all connection attempts are exhausted.
pub async fn init_pool(config: &StorageConfig) -> std::result::Result<DbPool, sqlx::Error> {
    let connect = || async move {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.database_url)
            .await
    };

    connect
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(10))
                .with_max_times(config.connect_attempts.saturating_sub(1)),
        )
        .notify(|e: &sqlx::Error, delay: Duration| {
            tracing::warn!(error = %e, retry_in_ms = %delay.as_millis(), "Database connection failed, retrying");
        })
        .await
}

/// Applies the embedded schema migrations.
///
/// # Errors
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}

/// Readiness check against the pool.
#[derive(Clone, Debug)]
pub struct PgHealth {
    pool: DbPool,
}

impl PgHealth {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreHealth for PgHealth {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Wires the Postgres repositories into a `Store`.
#[must_use]
pub fn store(pool: DbPool) -> Store {
    Store {
        users: Arc::new(UserRepository::new(pool.clone())),
        messages: Arc::new(MessageRepository::new(pool.clone())),
        health: Arc::new(PgHealth::new(pool)),
    }
}
