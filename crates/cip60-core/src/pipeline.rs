//! The block pipeline — scans one fetched block, normalizes and stores
//! its tagged payloads, then advances the cursor.
//!
//! Per-block ordering invariant: the cursor is advanced only after every
//! payload in the block has been handled and every storage write
//! succeeded. A non-conflict storage error fails the whole block so the
//! cursor stays behind it and the block is replayed after reconnect.

use std::sync::Arc;

use serde_json::Value;

use crate::checkpoint::CheckpointManager;
use crate::cursor::Cursor;
use crate::error::IndexerError;
use crate::normalize::{normalize, version_label};
use crate::progress::{ProgressFeed, SyncProgress};
use crate::scan::{asset_location, find_tagged_payloads, TaggedPayload};
use crate::store::{AssetStore, CanonicalRecord};

/// What happened to one fetched block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The block was scanned and the cursor advanced.
    Processed { slot: u64, records: usize },
    /// The response carried no usable block (e.g. a rollback
    /// notification or a block missing slot/hash fields).
    Skipped,
}

/// Orchestrates scan → normalize → store → cursor advance for each block.
pub struct BlockPipeline {
    cursor: Cursor,
    assets: Arc<dyn AssetStore>,
    checkpoint: CheckpointManager,
    progress: ProgressFeed,
}

impl BlockPipeline {
    pub fn new(
        cursor: Cursor,
        assets: Arc<dyn AssetStore>,
        checkpoint: CheckpointManager,
        progress: ProgressFeed,
    ) -> Self {
        Self {
            cursor,
            assets,
            checkpoint,
            progress,
        }
    }

    /// The newest fully processed position.
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Process one `nextBlock` result.
    ///
    /// Malformed payloads are logged and skipped so a single bad
    /// transaction cannot stall the stream; storage errors propagate
    /// and leave the cursor untouched.
    pub async fn process(&mut self, result: &Value) -> Result<BlockOutcome, IndexerError> {
        let Some(block) = result.get("block") else {
            tracing::debug!("response without block payload, skipping");
            return Ok(BlockOutcome::Skipped);
        };
        let (Some(slot), Some(hash)) = (
            block.get("slot").and_then(Value::as_u64),
            block.get("id").and_then(Value::as_str),
        ) else {
            tracing::debug!("block without slot/id fields, skipping");
            return Ok(BlockOutcome::Skipped);
        };

        let mut records = 0usize;
        if let Some(txs) = block.get("transactions").and_then(Value::as_array) {
            for tx in txs {
                let Some(metadata) = tx.get("metadata") else {
                    continue;
                };
                for tagged in find_tagged_payloads(metadata) {
                    match self.handle_payload(&tagged).await {
                        Ok(true) => records += 1,
                        Ok(false) => {}
                        Err(err @ IndexerError::Storage(_)) => return Err(err),
                        Err(err) => {
                            tracing::warn!(slot, error = %err, "skipping malformed payload");
                        }
                    }
                }
            }
        }

        self.cursor.advance(slot, hash);

        // A failed periodic checkpoint is not fatal: the cursor already
        // advanced and upsert idempotency covers the wider replay window.
        if let Err(err) = self.checkpoint.maybe_save(&self.cursor).await {
            tracing::warn!(error = %err, "periodic checkpoint failed");
        }

        if let Some(tip_slot) = result
            .get("tip")
            .and_then(|tip| tip.get("slot"))
            .and_then(Value::as_u64)
        {
            self.progress.publish(SyncProgress {
                current_slot: slot,
                network_tip: tip_slot,
            });
        }

        Ok(BlockOutcome::Processed { slot, records })
    }

    async fn handle_payload(&self, tagged: &TaggedPayload) -> Result<bool, IndexerError> {
        let Some((policy_id, asset_name)) = asset_location(&tagged.path) else {
            return Ok(false);
        };

        let metadata_version = version_label(&tagged.payload);
        // Unknown versions are stored raw as a best-effort record.
        let metadata_json = match normalize(&tagged.payload) {
            Some(meta) => serde_json::to_value(meta)
                .map_err(|e| IndexerError::Other(format!("serialize normalized metadata: {e}")))?,
            None => tagged.payload.clone(),
        };

        let record = CanonicalRecord {
            policy_id,
            asset_name,
            metadata_version,
            metadata_json,
        };
        self.assets.upsert(&record).await?;

        tracing::info!(
            policy = %short_hash(&record.policy_id),
            asset = %record.asset_name,
            version = %record.metadata_version,
            "music token indexed"
        );
        Ok(true)
    }

    /// Persist the final cursor if it is ahead of the last durable
    /// checkpoint. Called once during graceful shutdown.
    pub async fn finalize(&mut self) -> Result<(), IndexerError> {
        self.checkpoint.final_save(&self.cursor).await
    }
}

fn short_hash(hash: &str) -> String {
    if hash.len() <= 16 {
        hash.to_string()
    } else {
        format!("{}…{}", &hash[..8], &hash[hash.len() - 8..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemAssets {
        rows: Mutex<HashMap<(String, String), CanonicalRecord>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl AssetStore for MemAssets {
        async fn upsert(&self, record: &CanonicalRecord) -> Result<(), IndexerError> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(IndexerError::Storage("injected failure".into()));
            }
            self.rows.lock().unwrap().insert(
                (record.policy_id.clone(), record.asset_name.clone()),
                record.clone(),
            );
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullCheckpoints;

    #[async_trait]
    impl crate::checkpoint::CheckpointStore for NullCheckpoints {
        async fn load(&self) -> Result<Option<Cursor>, IndexerError> {
            Ok(None)
        }
        async fn save(&self, _cursor: &Cursor) -> Result<(), IndexerError> {
            Ok(())
        }
    }

    fn pipeline(assets: Arc<MemAssets>) -> BlockPipeline {
        BlockPipeline::new(
            Cursor::fallback(),
            assets,
            CheckpointManager::new(Arc::new(NullCheckpoints), 1_000_000),
            ProgressFeed::default(),
        )
    }

    fn block_with_payload(slot: u64, hash: &str, payload: Value) -> Value {
        json!({
            "block": {
                "slot": slot,
                "id": hash,
                "transactions": [
                    { "metadata": { "721": { "pol": { "song": payload } } } }
                ]
            },
            "tip": { "slot": 100_000_000u64 }
        })
    }

    #[tokio::test]
    async fn processes_block_and_advances_cursor() {
        let assets = Arc::new(MemAssets::default());
        let mut pipe = pipeline(assets.clone());

        let result = block_with_payload(
            60_000_000,
            "hash60",
            json!({
                "music_metadata_version": 3,
                "release": { "artists": ["A"] },
                "files": [{ "song": { "song_title": "T", "artists": [{"B": {}}] } }]
            }),
        );

        let outcome = pipe.process(&result).await.unwrap();
        assert_eq!(
            outcome,
            BlockOutcome::Processed {
                slot: 60_000_000,
                records: 1
            }
        );
        assert_eq!(pipe.cursor().slot, 60_000_000);
        assert_eq!(pipe.cursor().block_hash, "hash60");

        let rows = assets.rows.lock().unwrap();
        let record = rows.get(&("pol".into(), "song".into())).unwrap();
        assert_eq!(record.metadata_version, "3");
        let artists = record.metadata_json["artists"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["name"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(artists, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn storage_failure_leaves_cursor_behind_block() {
        let assets = Arc::new(MemAssets::default());
        assets.fail.store(true, Ordering::Relaxed);
        let mut pipe = pipeline(assets.clone());
        let before = pipe.cursor().clone();

        let result = block_with_payload(
            60_000_001,
            "hash61",
            json!({ "music_metadata_version": 2 }),
        );
        let err = pipe.process(&result).await.unwrap_err();
        assert!(matches!(err, IndexerError::Storage(_)));
        assert_eq!(pipe.cursor(), &before);
    }

    #[tokio::test]
    async fn block_without_slot_or_id_is_skipped() {
        let assets = Arc::new(MemAssets::default());
        let mut pipe = pipeline(assets.clone());
        let before = pipe.cursor().clone();

        let outcome = pipe
            .process(&json!({ "block": { "transactions": [] } }))
            .await
            .unwrap();
        assert_eq!(outcome, BlockOutcome::Skipped);
        assert_eq!(pipe.cursor(), &before);

        // Rollback notification: no block at all
        let outcome = pipe
            .process(&json!({ "point": { "slot": 1, "id": "x" } }))
            .await
            .unwrap();
        assert_eq!(outcome, BlockOutcome::Skipped);
    }

    #[tokio::test]
    async fn unactionable_payload_short_path_yields_no_record() {
        let assets = Arc::new(MemAssets::default());
        let mut pipe = pipeline(assets.clone());

        // Marker followed by only one segment: not actionable
        let result = json!({
            "block": {
                "slot": 60_000_002u64,
                "id": "hash62",
                "transactions": [
                    { "metadata": { "721": { "only-policy": { "music_metadata_version": 1 } } } }
                ]
            }
        });
        let outcome = pipe.process(&result).await.unwrap();
        assert_eq!(
            outcome,
            BlockOutcome::Processed {
                slot: 60_000_002,
                records: 0
            }
        );
        assert!(assets.rows.lock().unwrap().is_empty());
        // Cursor still advances: the block was fully scanned
        assert_eq!(pipe.cursor().slot, 60_000_002);
    }

    #[tokio::test]
    async fn unknown_version_stored_raw() {
        let assets = Arc::new(MemAssets::default());
        let mut pipe = pipeline(assets.clone());

        let payload = json!({ "music_metadata_version": 42, "weird": true });
        let result = block_with_payload(60_000_003, "hash63", payload.clone());
        pipe.process(&result).await.unwrap();

        let rows = assets.rows.lock().unwrap();
        let record = rows.get(&("pol".into(), "song".into())).unwrap();
        assert_eq!(record.metadata_version, "42");
        assert_eq!(record.metadata_json, payload);
    }

    #[tokio::test]
    async fn tip_emits_progress_sample() {
        let assets = Arc::new(MemAssets::default());
        let progress = ProgressFeed::default();
        let mut rx = progress.subscribe();
        let mut pipe = BlockPipeline::new(
            Cursor::fallback(),
            assets,
            CheckpointManager::new(Arc::new(NullCheckpoints), 1_000_000),
            progress.clone(),
        );

        let result = block_with_payload(
            60_000_004,
            "hash64",
            json!({ "music_metadata_version": 1 }),
        );
        pipe.process(&result).await.unwrap();

        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.current_slot, 60_000_004);
        assert_eq!(sample.network_tip, 100_000_000);
    }
}
