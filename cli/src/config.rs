//! Environment-driven configuration for the indexer daemon.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Everything the daemon needs, resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ogmios WebSocket endpoint, e.g. `ws://localhost:1337`.
    pub ogmios_url: String,
    /// libpq-style Postgres connection string.
    pub database_url: String,
    /// Chain progress (in slots) between durable checkpoint writes.
    pub checkpoint_interval_slots: u64,
    /// Deadline for correlated request/response calls.
    pub request_timeout: Duration,
    /// Reconnect backoff starting delay.
    pub reconnect_base: Duration,
    /// Reconnect backoff ceiling.
    pub reconnect_cap: Duration,
    /// How long shutdown waits for the sync loop to drain.
    pub shutdown_grace: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let ogmios_url =
            env::var("OGMIOS_URL").context("OGMIOS_URL must be set (e.g. ws://localhost:1337)")?;

        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => composed_database_url()?,
        };

        Ok(Self {
            ogmios_url,
            database_url,
            checkpoint_interval_slots: env_u64("CHECKPOINT_INTERVAL_SLOTS", 1_000_000)?,
            request_timeout: Duration::from_millis(env_u64("REQUEST_TIMEOUT_MS", 10_000)?),
            reconnect_base: Duration::from_millis(env_u64("RECONNECT_BASE_MS", 1_000)?),
            reconnect_cap: Duration::from_millis(env_u64("RECONNECT_CAP_MS", 60_000)?),
            shutdown_grace: Duration::from_secs(env_u64("SHUTDOWN_GRACE_SECS", 30)?),
        })
    }
}

/// Fall back to the individual DB_* variables when DATABASE_URL is absent.
fn composed_database_url() -> Result<String> {
    let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let name = match env::var("DB_NAME") {
        Ok(name) => name,
        Err(_) => bail!("set DATABASE_URL, or DB_NAME (with optional DB_HOST/DB_PORT/DB_USER/DB_PASSWORD)"),
    };
    let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = env::var("DB_PASSWORD").unwrap_or_default();

    Ok(if password.is_empty() {
        format!("postgresql://{user}@{host}:{port}/{name}")
    } else {
        format!("postgresql://{user}:{password}@{host}:{port}/{name}")
    })
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u64_falls_back_to_default() {
        assert_eq!(env_u64("CIP60_TEST_UNSET_VAR", 42).unwrap(), 42);
    }
}
