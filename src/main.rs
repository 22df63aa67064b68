use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gatehouse::app::{AppState, build_router};
use gatehouse::config::Config;
use gatehouse::db;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let db = db::connect_with_retry(&config.database_url, Duration::from_secs(30)).await?;
    db::schema_sync::sync_all_tables(&db).await?;
    db::schema_sync::run_seeds(&db, &config).await?;

    let port = config.port;
    let state = AppState::new(config, db);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
