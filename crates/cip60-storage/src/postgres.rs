//! PostgreSQL storage backend.
//!
//! Persists canonical asset records and indexer checkpoints using `sqlx`
//! with connection pooling.
//!
//! # Feature Flag
//! Requires the `postgres` feature:
//! ```toml
//! cip60-storage = { version = "0.2", features = ["postgres"] }
//! ```
//!
//! # Schema
//! The schema is expected to exist already (managed out of band):
//! - `cip60.assets` — one row per `(policy_id, asset_name)` with the
//!   normalized metadata as JSONB
//! - `cip60.indexer_state` — append-only cursor history; the newest row
//!   by `updated_at` is the authoritative resume point

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use cip60_core::{AssetStore, CanonicalRecord, CheckpointStore, Cursor, IndexerError};

// ─── Connection options ────────────────────────────────────────────────────────

/// Connection options for the Postgres storage backend.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of idle connections to keep open (default: 1)
    pub min_connections: u32,
    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

// ─── PostgresStorage ─────────────────────────────────────────────────────────

/// PostgreSQL-backed storage for asset records and checkpoints.
///
/// Thread-safe and cheaply cloneable — wraps a connection pool internally.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to a PostgreSQL database.
    ///
    /// The URL format follows libpq convention:
    /// `postgresql://[user[:password]@][host][:port][/dbname]`
    pub async fn connect(database_url: &str) -> Result<Self, IndexerError> {
        Self::connect_with_options(database_url, PostgresOptions::default()).await
    }

    /// Connect with custom pool options.
    pub async fn connect_with_options(
        database_url: &str,
        opts: PostgresOptions,
    ) -> Result<Self, IndexerError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(opts.connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| IndexerError::Storage(format!("postgres connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Verify the connection is alive. Run once at startup so a bad URL
    /// or unreachable database fails fast instead of on the first block.
    pub async fn ping(&self) -> Result<(), IndexerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(format!("postgres ping: {e}")))?;
        Ok(())
    }

    /// Close the pool, waiting for in-flight queries to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool (for custom queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

// ─── AssetStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl AssetStore for PostgresStorage {
    async fn upsert(&self, record: &CanonicalRecord) -> Result<(), IndexerError> {
        let inserted = sqlx::query(
            "INSERT INTO cip60.assets (policy_id, asset_name, metadata_json, metadata_version)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&record.policy_id)
        .bind(&record.asset_name)
        .bind(&record.metadata_json)
        .bind(&record.metadata_version)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                // Minted again: later metadata replaces the stored row.
                sqlx::query(
                    "UPDATE cip60.assets
                     SET metadata_json = $3, metadata_version = $4, updated_at = NOW()
                     WHERE policy_id = $1 AND asset_name = $2",
                )
                .bind(&record.policy_id)
                .bind(&record.asset_name)
                .bind(&record.metadata_json)
                .bind(&record.metadata_version)
                .execute(&self.pool)
                .await
                .map_err(|e| IndexerError::Storage(format!("asset update: {e}")))?;

                debug!(
                    policy_id = %record.policy_id,
                    asset_name = %record.asset_name,
                    "asset row updated on re-mint"
                );
                Ok(())
            }
            Err(e) => Err(IndexerError::Storage(format!("asset insert: {e}"))),
        }
    }
}

// ─── CheckpointStore impl ─────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for PostgresStorage {
    async fn load(&self) -> Result<Option<Cursor>, IndexerError> {
        let row = sqlx::query(
            "SELECT last_slot, last_block_hash
             FROM cip60.indexer_state
             ORDER BY updated_at DESC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(format!("checkpoint load: {e}")))?;

        Ok(row.map(|r| Cursor {
            slot: r.get::<i64, _>("last_slot") as u64,
            block_hash: r.get::<String, _>("last_block_hash"),
        }))
    }

    async fn save(&self, cursor: &Cursor) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO cip60.indexer_state (last_slot, last_block_hash)
             VALUES ($1, $2)",
        )
        .bind(cursor.slot as i64)
        .bind(&cursor.block_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(format!("checkpoint save: {e}")))?;

        debug!(slot = cursor.slot, "checkpoint row appended");
        Ok(())
    }
}
