//! In-memory storage backend.
//!
//! Holds asset records and checkpoint rows in RAM. Useful for tests and
//! for running the pipeline without a database; everything is lost when
//! the process exits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use cip60_core::{AssetStore, CanonicalRecord, CheckpointStore, Cursor, IndexerError};

/// In-memory indexer storage.
#[derive(Default)]
pub struct MemoryStorage {
    assets: Mutex<HashMap<(String, String), CanonicalRecord>>,
    checkpoints: Mutex<Vec<Cursor>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stored record by natural key.
    pub fn get(&self, policy_id: &str, asset_name: &str) -> Option<CanonicalRecord> {
        self.assets
            .lock()
            .unwrap()
            .get(&(policy_id.to_string(), asset_name.to_string()))
            .cloned()
    }

    /// Number of distinct asset rows.
    pub fn asset_count(&self) -> usize {
        self.assets.lock().unwrap().len()
    }

    /// Number of checkpoint rows appended so far.
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.lock().unwrap().len()
    }
}

#[async_trait]
impl AssetStore for MemoryStorage {
    async fn upsert(&self, record: &CanonicalRecord) -> Result<(), IndexerError> {
        self.assets.lock().unwrap().insert(
            (record.policy_id.clone(), record.asset_name.clone()),
            record.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStorage {
    async fn load(&self) -> Result<Option<Cursor>, IndexerError> {
        Ok(self.checkpoints.lock().unwrap().last().cloned())
    }

    async fn save(&self, cursor: &Cursor) -> Result<(), IndexerError> {
        self.checkpoints.lock().unwrap().push(cursor.clone());
        Ok(())
    }
}
