use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use duewatch_core::config::PostgresConfig;

/// Connect to PostgreSQL and bring the schema up to date. The alert log
/// arbitrates concurrent runs, so the server refuses to start without a
/// reachable database.
pub async fn init_pg_pool(config: &PostgresConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.url())
        .await
        .with_context(|| {
            format!(
                "failed to connect to PostgreSQL at {}:{}/{}",
                config.host, config.port, config.database
            )
        })?;
    info!(host = %config.host, database = %config.database, "PostgreSQL connected");

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("failed to apply database migrations")?;
    info!("database migrations applied");

    Ok(pool)
}
