//! Transport-level error types.

use thiserror::Error;

use crate::protocol::RpcError;

/// Errors that can occur on the Ogmios connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket connection/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The socket did not open within the configured timeout.
    #[error("connect timed out after {ms}ms")]
    ConnectTimeout { ms: u64 },

    /// No correlated response arrived within the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The node returned an `error` envelope.
    #[error("{0}")]
    Rpc(RpcError),

    /// A request with this id is already awaiting a response.
    #[error("request id already in flight: {0}")]
    DuplicateId(String),

    /// The connection closed while a request was outstanding, or a send
    /// was attempted on a torn-down connection.
    #[error("connection closed")]
    Closed,
}

impl From<TransportError> for cip60_core::IndexerError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}
