//! Database connection management.

pub mod schema_sync;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn};

pub type Database = SqlitePool;

fn connect_options(url: &str) -> Result<SqliteConnectOptions> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database url: {url}"))?
        .create_if_missing(true)
        // Cascade/restrict behavior on deletes relies on the engine
        // enforcing declared foreign keys.
        .foreign_keys(true);
    Ok(options)
}

pub async fn connect(url: &str) -> Result<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options(url)?)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    Ok(pool)
}

/// Connect, retrying until `timeout` elapses. Used at startup so the service
/// survives the database file's volume appearing late.
pub async fn connect_with_retry(url: &str, timeout: Duration) -> Result<Database> {
    let started = std::time::Instant::now();
    let mut attempt = 1u32;
    loop {
        match connect(url).await {
            Ok(pool) => {
                info!(url, attempt, "database connected");
                return Ok(pool);
            }
            Err(e) if started.elapsed() < timeout => {
                warn!(url, attempt, error = %e, "database connect failed, retrying");
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// In-memory database for tests. Capped at one connection so every query
/// sees the same in-memory file.
pub async fn connect_memory() -> Result<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options("sqlite::memory:")?)
        .await
        .context("failed to open in-memory database")?;
    Ok(pool)
}
