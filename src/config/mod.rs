//! Environment-driven configuration.

use anyhow::{Context, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    /// Access token lifetime in seconds.
    pub access_token_ttl: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_token_ttl: i64,
    pub admin_email: String,
    pub admin_password: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env_or("PORT", "8000")
            .parse::<u16>()
            .context("PORT must be a number")?;
        let database_url = env_or("DATABASE_URL", "sqlite://gatehouse.db");

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                // Tokens stop verifying across restarts without a pinned
                // secret; acceptable for local runs only.
                warn!("JWT_SECRET not set, generating an ephemeral secret");
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(48)
                    .map(char::from)
                    .collect()
            }
        };

        let access_token_ttl = env_or("ACCESS_TOKEN_TTL_SECONDS", "1800")
            .parse::<i64>()
            .context("ACCESS_TOKEN_TTL_SECONDS must be a number")?;
        let refresh_token_ttl = env_or("REFRESH_TOKEN_TTL_SECONDS", "604800")
            .parse::<i64>()
            .context("REFRESH_TOKEN_TTL_SECONDS must be a number")?;

        Ok(Self {
            port,
            database_url,
            jwt_secret,
            access_token_ttl,
            refresh_token_ttl,
            admin_email: env_or("ADMIN_EMAIL", "admin@example.com"),
            admin_password: env_or("ADMIN_PASSWORD", "admin"),
        })
    }

    /// Fixed configuration for tests; no environment reads.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            access_token_ttl: 1800,
            refresh_token_ttl: 604_800,
            admin_email: "admin@example.com".to_string(),
            admin_password: "admin".to_string(),
        }
    }
}
