pub mod accounts;
pub mod create;
pub mod refresh_tokens;
pub mod utils;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

use shared::types::DatabaseConfig;

pub use create::create_tables;

/// Open the pool described by `[database]`. The file is created if missing.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("Invalid database url: {}", config.url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", config.url))?;

    info!("Database pool opened ({} connections max)", config.max_connections);
    Ok(pool)
}

/// Single-connection in-memory pool. Every connection to `sqlite::memory:`
/// is its own database, so the pool must never open a second one.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .context("Invalid in-memory database url")?
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .context("Failed to open in-memory database")
}
