//! cip60-core — foundation for the CIP-60 music-token indexing engine.
//!
//! # Architecture
//!
//! ```text
//! ChainSync (cip60-ogmios) → BlockPipeline
//!                                ├── scan             (tagged-payload discovery)
//!                                ├── normalize        (version 1/2/3 → canonical shape)
//!                                ├── Cursor           (resume position, era boundaries)
//!                                ├── CheckpointManager (crash recovery)
//!                                ├── ProgressFeed     (one-way sync progress)
//!                                └── AssetStore       (memory / Postgres backends)
//! ```

pub mod checkpoint;
pub mod cursor;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod scan;
pub mod store;

pub use checkpoint::{CheckpointManager, CheckpointStore};
pub use cursor::{Cursor, Point, ERA_BOUNDARIES};
pub use error::IndexerError;
pub use normalize::{normalize, Artist, Copyright, NormalizedMetadata};
pub use pipeline::{BlockOutcome, BlockPipeline};
pub use progress::{ProgressFeed, SyncProgress};
pub use scan::{asset_location, find_tagged_payloads, TaggedPayload};
pub use store::{AssetStore, CanonicalRecord};
