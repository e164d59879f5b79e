//! cip60-indexer — CIP-60 music-token indexer daemon.
//!
//! Streams blocks from an Ogmios endpoint, extracts and normalizes
//! CIP-60 music metadata, and upserts canonical records into Postgres.
//! Runs until SIGINT/SIGTERM, then drains gracefully.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cip60_core::{BlockPipeline, CheckpointManager, Cursor, ProgressFeed};
use cip60_ogmios::{health_check, ChainSync, SyncConfig};
use cip60_storage::PostgresStorage;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(ogmios = %config.ogmios_url, "starting cip60-indexer");

    // Fail fast on a bad database before touching the chain.
    let storage = PostgresStorage::connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;
    storage.ping().await.context("Postgres ping")?;

    // And on an unreachable node.
    health_check(&config.ogmios_url, Duration::from_secs(10))
        .await
        .context("Ogmios health check")?;

    let mut checkpoint = CheckpointManager::new(
        Arc::new(storage.clone()),
        config.checkpoint_interval_slots,
    );
    let cursor = match checkpoint.load().await.context("loading checkpoint")? {
        Some(cursor) => {
            info!(slot = cursor.slot, hash = %cursor.block_hash, "resuming from checkpoint");
            cursor
        }
        None => {
            let cursor = Cursor::fallback();
            info!(slot = cursor.slot, "no checkpoint found, starting from fallback point");
            cursor
        }
    };

    let progress = ProgressFeed::default();
    spawn_progress_logger(&progress);

    let pipeline = BlockPipeline::new(cursor, Arc::new(storage.clone()), checkpoint, progress);

    let mut sync_config = SyncConfig::new(&config.ogmios_url);
    sync_config.connection.request_timeout = config.request_timeout;
    sync_config.reconnect_base = config.reconnect_base;
    sync_config.reconnect_cap = config.reconnect_cap;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync = ChainSync::new(sync_config, pipeline, shutdown_rx);
    let handle = tokio::spawn(sync.run());

    wait_for_signal().await?;
    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    match time::timeout(config.shutdown_grace, handle).await {
        Ok(joined) => joined.context("sync task panicked")??,
        Err(_) => warn!(
            grace_secs = config.shutdown_grace.as_secs(),
            "sync loop did not drain within the grace period"
        ),
    }

    storage.close().await;
    info!("stopped");
    Ok(())
}

/// Log a progress sample periodically instead of once per block.
fn spawn_progress_logger(feed: &ProgressFeed) {
    use tokio::sync::broadcast::error::RecvError;

    let mut rx = feed.subscribe();
    tokio::spawn(async move {
        let mut last_logged: Option<time::Instant> = None;
        loop {
            let sample = match rx.recv().await {
                Ok(sample) => sample,
                // Falling behind the feed just means skipped samples.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            let due = last_logged
                .map(|at| at.elapsed() >= Duration::from_secs(30))
                .unwrap_or(true);
            if due {
                info!(
                    slot = sample.current_slot,
                    tip = sample.network_tip,
                    percent = format!("{:.2}", sample.ratio() * 100.0),
                    "sync progress"
                );
                last_logged = Some(time::Instant::now());
            }
        }
    });
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("installing SIGINT handler")?,
            _ = term.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("installing ctrl-c handler")
    }
}
