//! Storage backends for the CIP-60 indexer.
//!
//! Two backends implement the core [`AssetStore`](cip60_core::AssetStore)
//! and [`CheckpointStore`](cip60_core::CheckpointStore) traits:
//!
//! - [`memory::MemoryStorage`] — RAM only, for tests and dry runs
//!   (feature `memory`, on by default).
//! - `postgres::PostgresStorage` — production backend against the
//!   pre-existing `cip60` schema (feature `postgres`).

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "memory")]
pub use memory::MemoryStorage;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStorage};
