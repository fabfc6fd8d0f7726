use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

const SCHEMA: &str = include_str!("../migrations/001_kiosk_schema.sql");

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("could not connect to DATABASE_URL")?;
    Ok(pool)
}

/// Applies the bundled schema: tables, indexes and `reset_day_archive()`.
pub async fn migrate(pg: &PgPool) -> anyhow::Result<()> {
    pg.execute(SCHEMA)
        .await
        .context("applying migrations/001_kiosk_schema.sql failed")?;
    log::info!("database schema is up to date");
    Ok(())
}
