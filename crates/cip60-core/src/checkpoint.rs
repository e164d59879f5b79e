//! Checkpoint manager — persists the cursor for crash recovery.
//!
//! Checkpoints are written sparsely (every `interval_slots` of chain
//! progress) because writing one per block would dominate write volume.
//! An unclean crash therefore replays up to one interval of blocks;
//! replay safety is guaranteed by the upsert idempotency of the asset
//! store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cursor::Cursor;
use crate::error::IndexerError;

/// Trait for durably storing and loading the cursor.
///
/// `save` appends a new state row rather than mutating one in place, so
/// the latest-by-timestamp row is always authoritative and `load` means
/// taking the most recent row.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self) -> Result<Option<Cursor>, IndexerError>;
    async fn save(&self, cursor: &Cursor) -> Result<(), IndexerError>;
}

/// Manages sparse checkpoint writes for the pipeline.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    interval_slots: u64,
    last_saved_slot: Option<u64>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, interval_slots: u64) -> Self {
        Self {
            store,
            interval_slots,
            last_saved_slot: None,
        }
    }

    /// Load the saved cursor, remembering its slot as the durable
    /// baseline (so shutdown only re-saves when we got further).
    pub async fn load(&mut self) -> Result<Option<Cursor>, IndexerError> {
        let cursor = self.store.load().await?;
        self.last_saved_slot = cursor.as_ref().map(|c| c.slot);
        Ok(cursor)
    }

    /// Save if at least `interval_slots` of chain progress happened
    /// since the last durable save. Call after each processed block.
    pub async fn maybe_save(&mut self, cursor: &Cursor) -> Result<(), IndexerError> {
        let due = match self.last_saved_slot {
            Some(saved) => cursor.slot.saturating_sub(saved) >= self.interval_slots,
            None => true,
        };
        if due {
            self.force_save(cursor).await?;
        }
        Ok(())
    }

    /// Save unconditionally if the in-memory cursor is ahead of the
    /// last durable checkpoint. Called on graceful shutdown.
    pub async fn final_save(&mut self, cursor: &Cursor) -> Result<(), IndexerError> {
        match self.last_saved_slot {
            Some(saved) if cursor.slot <= saved => Ok(()),
            _ => self.force_save(cursor).await,
        }
    }

    async fn force_save(&mut self, cursor: &Cursor) -> Result<(), IndexerError> {
        self.store.save(cursor).await?;
        self.last_saved_slot = Some(cursor.slot);
        tracing::info!(slot = cursor.slot, hash = %cursor.block_hash, "checkpoint saved");
        Ok(())
    }
}
