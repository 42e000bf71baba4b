//! Connection pool and schema migrations for the canonical store

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Canonical store migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = Result<T, DbError>;

pub async fn create_pool(config: &DatabaseConfig) -> DbResult<PgPool> {
    let DatabaseConfig {
        url,
        max_connections,
        min_connections,
        connect_timeout_secs,
        idle_timeout_secs,
    } = config;

    let pool = PgPoolOptions::new()
        .max_connections(*max_connections)
        .min_connections(*min_connections)
        .acquire_timeout(Duration::from_secs(*connect_timeout_secs))
        .idle_timeout(Duration::from_secs(*idle_timeout_secs))
        .connect(url)
        .await?;

    info!(max_connections, min_connections, "Canonical store pool ready");
    Ok(pool)
}

/// Creates `canonical_records` on first start
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Canonical store schema is current");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    let _: i32 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
