//! cip60-ogmios — Ogmios WebSocket transport and the supervised
//! chain-sync loop.
//!
//! The [`Connection`] owns one WebSocket session and correlates
//! JSON-RPC responses to callers through a pending-request map; the
//! [`ChainSync`] supervisor owns the connection lifecycle (health
//! probe, exponential-backoff reconnect, intersection negotiation) and
//! drives the strictly sequential next-block loop.

pub mod connection;
pub mod error;
pub mod protocol;
pub mod sync;

pub use connection::{health_check, Connection, ConnectionConfig};
pub use error::TransportError;
pub use protocol::{Request, Response, RpcError};
pub use sync::{ChainSync, SyncConfig, SyncState};
