//! The supervised chain-sync loop.
//!
//! One connection, one outstanding `nextBlock` request, strictly
//! sequential: the node is never asked for block N+1 until block N has
//! been fully scanned and stored, which is the natural backpressure of
//! the pull-based stream. The supervisor owns reconnection with
//! exponential backoff and re-negotiates the intersection from the
//! durable cursor on every (re)connect, so a dropped stream resumes
//! from the last fully processed block rather than where it broke.

use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::time;

use cip60_core::{BlockOutcome, BlockPipeline, IndexerError};

use crate::connection::{Connection, ConnectionConfig};
use crate::protocol::{
    FIND_INTERSECTION, FIND_INTERSECTION_ID, NEXT_BLOCK, QUERY_BLOCK_HEIGHT, QUERY_HEIGHT_ID,
};

/// Configuration for the sync loop.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Ogmios endpoint, e.g. `ws://localhost:1337`.
    pub url: String,
    pub connection: ConnectionConfig,
    /// Reconnect backoff starting delay.
    pub reconnect_base: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_cap: Duration,
    /// How many times to retry intersection negotiation before the
    /// connection is treated as unusable.
    pub negotiation_attempts: u32,
    /// Fixed delay between negotiation retries.
    pub negotiation_retry_delay: Duration,
}

impl SyncConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: ConnectionConfig::default(),
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(60),
            negotiation_attempts: 3,
            negotiation_retry_delay: Duration::from_secs(5),
        }
    }
}

/// Where the loop currently is in the negotiation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No usable connection.
    Idle,
    /// Connected, finding an intersection.
    Negotiating,
    /// Streaming blocks.
    Synced,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Negotiating => write!(f, "negotiating"),
            Self::Synced => write!(f, "synced"),
        }
    }
}

/// Exponential reconnect backoff: `min(cap, base * 2^attempt)`, reset
/// to the base on every successful open.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// The delay for the current attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u64.checked_shl(self.attempt).unwrap_or(u64::MAX);
        let ms = (self.base.as_millis() as u64)
            .saturating_mul(factor)
            .min(self.cap.as_millis() as u64);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(ms)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Drives connect → negotiate → stream until shut down.
pub struct ChainSync {
    config: SyncConfig,
    pipeline: BlockPipeline,
    shutdown: watch::Receiver<bool>,
    state: SyncState,
    next_block_seq: u64,
}

impl ChainSync {
    pub fn new(config: SyncConfig, pipeline: BlockPipeline, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            config,
            pipeline,
            shutdown,
            state: SyncState::Idle,
            next_block_seq: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Run until the shutdown signal fires, then persist the final
    /// cursor. Connection and negotiation errors never escape: they
    /// feed the backoff and reconnect path.
    pub async fn run(mut self) -> Result<(), IndexerError> {
        let mut backoff = Backoff::new(self.config.reconnect_base, self.config.reconnect_cap);

        loop {
            if self.shutdown_requested() {
                break;
            }
            self.state = SyncState::Idle;

            let conn = match Connection::open(&self.config.url, self.config.connection.clone()).await
            {
                Ok(conn) => conn,
                Err(err) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(error = %err, ?delay, "connect failed, reconnecting");
                    if !self.sleep_or_shutdown(delay).await {
                        break;
                    }
                    continue;
                }
            };
            backoff.reset();

            match self.session(&conn).await {
                Ok(()) => {
                    // Shutdown requested mid-stream
                    conn.close();
                    break;
                }
                Err(err) => {
                    conn.close();
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %err,
                        cursor_slot = self.pipeline.cursor().slot,
                        ?delay,
                        "session ended, reconnecting"
                    );
                    if !self.sleep_or_shutdown(delay).await {
                        break;
                    }
                }
            }
        }

        self.state = SyncState::Idle;
        tracing::info!(slot = self.pipeline.cursor().slot, "sync loop stopped");
        self.pipeline.finalize().await
    }

    /// One connection's worth of work: negotiate, then stream blocks
    /// until the connection dies or shutdown is requested.
    async fn session(&mut self, conn: &Connection) -> Result<(), IndexerError> {
        self.state = SyncState::Negotiating;

        // A height query that cannot complete means the connection is
        // not worth negotiating on.
        let height = conn
            .request(QUERY_BLOCK_HEIGHT, json!({}), QUERY_HEIGHT_ID)
            .await
            .map_err(IndexerError::from)?;
        tracing::info!(height = %height, "network block height");

        self.negotiate(conn).await?;
        self.state = SyncState::Synced;

        loop {
            if self.shutdown_requested() {
                return Ok(());
            }

            self.next_block_seq += 1;
            let id = format!("next-block/{}", self.next_block_seq);

            let result = tokio::select! {
                res = conn.request_no_timeout(NEXT_BLOCK, json!({}), id) => {
                    res.map_err(IndexerError::from)?
                }
                _ = self.shutdown.changed() => return Ok(()),
            };

            if let BlockOutcome::Processed { slot, records } = self.pipeline.process(&result).await?
            {
                if records > 0 {
                    tracing::debug!(slot, records, "block processed");
                }
            }
        }
    }

    async fn negotiate(&mut self, conn: &Connection) -> Result<(), IndexerError> {
        let attempts = self.config.negotiation_attempts.max(1);

        for attempt in 1..=attempts {
            let points = self.pipeline.cursor().intersection_points();
            tracing::info!(
                candidates = points.len(),
                newest_slot = points[0].slot,
                "requesting intersection"
            );

            match conn
                .request(FIND_INTERSECTION, json!({ "points": points }), FIND_INTERSECTION_ID)
                .await
            {
                Ok(_) => {
                    tracing::info!("intersection found");
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "intersection negotiation failed");
                    if attempt < attempts {
                        time::sleep(self.config.negotiation_retry_delay).await;
                    }
                }
            }
        }

        Err(IndexerError::Negotiation { attempts })
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for `delay`, returning `false` if shutdown fired first.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = time::sleep(delay) => true,
            _ = self.shutdown.changed() => false,
        }
    }
}
