//! Error types for the indexing pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("intersection negotiation failed after {attempts} attempts")]
    Negotiation { attempts: u32 },

    #[error("{0}")]
    Other(String),
}
