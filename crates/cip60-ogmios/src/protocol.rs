//! JSON-RPC 2.0 wire envelopes for the Ogmios ledger-query protocol.
//!
//! Only the chain-sync subset is modelled: height query,
//! find-intersection, and next-block. Responses are correlated purely
//! by echoing the request id, which this client always issues as a
//! string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Methods used by the indexer.
pub const QUERY_BLOCK_HEIGHT: &str = "queryNetwork/blockHeight";
pub const FIND_INTERSECTION: &str = "findIntersection";
pub const NEXT_BLOCK: &str = "nextBlock";

/// Well-known request ids for the one-shot negotiation calls.
pub const QUERY_HEIGHT_ID: &str = "query-height";
pub const FIND_INTERSECTION_ID: &str = "find-intersection";

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
    pub id: String,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Value, id: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response.
///
/// The id is kept loose (`Value`) because correlation must tolerate
/// whatever the node echoes back; [`Response::id_str`] renders it for
/// the pending-request map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// The echoed id as a map key, if any.
    pub fn id_str(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Unwrap the result value or return the error envelope.
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}
