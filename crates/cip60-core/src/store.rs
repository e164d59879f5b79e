//! Canonical asset records and the storage trait they are written through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IndexerError;

/// A normalized music-token record ready for storage.
///
/// Natural key: `(policy_id, asset_name)`. A later sighting of the same
/// key overwrites the mutable fields (`metadata_version`,
/// `metadata_json`) in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub policy_id: String,
    pub asset_name: String,
    pub metadata_version: String,
    pub metadata_json: Value,
}

/// Trait for persisting canonical records.
///
/// Implementations include `MemoryStorage` and `PostgresStorage` in
/// `cip60-storage`.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Insert the record, or update the existing row on a natural-key
    /// conflict. A duplicate key is expected control flow, never an
    /// error surfaced to the caller.
    async fn upsert(&self, record: &CanonicalRecord) -> Result<(), IndexerError>;
}
