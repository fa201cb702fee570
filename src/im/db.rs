//! SQLite helpers: create the pool and run the embedded migrations
//!
//! Migrations live in `migrations/` at the crate root and are embedded with
//! `sqlx::migrate!()`.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

/// Creates a pool for `db_url` and applies pending migrations
///
/// In-memory URLs get a single connection that never expires, otherwise every
/// pooled connection would see its own empty database.
pub async fn create_sqlite_pool_with_migration(db_url: &str) -> Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("invalid sqlite url: {}", db_url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let in_memory = db_url.contains(":memory:") || db_url.contains("mode=memory");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open sqlite database: {}", db_url))?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    info!("[Store/DB] database ready: {}", db_url);
    Ok(pool)
}
