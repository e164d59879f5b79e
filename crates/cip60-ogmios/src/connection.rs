//! One WebSocket session with pending-request correlation.
//!
//! A background task owns the socket; callers reach it through a
//! command channel and receive their correlated response on a one-shot
//! channel registered in the pending map. The connection is
//! session-scoped: when the socket dies the task drains every pending
//! request with a closed error and exits, and all later sends fail
//! fast — reconnection belongs to the [`ChainSync`](crate::sync::ChainSync)
//! supervisor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;
use crate::protocol::{Request, Response};

type ResponseSender = oneshot::Sender<Result<Response, TransportError>>;
type PendingMap = Arc<Mutex<HashMap<String, ResponseSender>>>;

/// Configuration for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long `open` waits for the socket to become ready.
    pub open_timeout: Duration,
    /// Default deadline for a correlated response.
    pub request_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

enum Command {
    Send(Request),
    Close,
}

/// A live duplex connection to the node.
pub struct Connection {
    cmd_tx: mpsc::UnboundedSender<Command>,
    pending: PendingMap,
    request_timeout: Duration,
}

impl Connection {
    /// Open the socket, blocking until ready or erroring on timeout.
    pub async fn open(url: &str, config: ConnectionConfig) -> Result<Self, TransportError> {
        let ms = config.open_timeout.as_millis() as u64;
        let (ws, _) = time::timeout(config.open_timeout, tokio_tungstenite::connect_async(url))
            .await
            .map_err(|_| TransportError::ConnectTimeout { ms })?
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(ws_task(ws, cmd_rx, pending.clone()));

        Ok(Self {
            cmd_tx,
            pending,
            request_timeout: config.request_timeout,
        })
    }

    /// Send a request and await its correlated response, rejecting with
    /// a timeout after the configured duration.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        id: impl Into<String>,
    ) -> Result<Value, TransportError> {
        self.request_with(method, params, id, Some(self.request_timeout))
            .await
    }

    /// Send a request and await its response without a deadline.
    ///
    /// Used for `nextBlock`, which long-polls at the chain tip: the wait
    /// is still bounded by the connection itself, since teardown drains
    /// the pending map.
    pub async fn request_no_timeout(
        &self,
        method: &str,
        params: Value,
        id: impl Into<String>,
    ) -> Result<Value, TransportError> {
        self.request_with(method, params, id, None).await
    }

    async fn request_with(
        &self,
        method: &str,
        params: Value,
        id: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Value, TransportError> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();
        register(&self.pending, &id, tx)?;

        let req = Request::new(method, params, id.clone());
        if self.cmd_tx.send(Command::Send(req)).is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(TransportError::Closed);
        }

        let received = match timeout {
            Some(limit) => match time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    // Deregister so a later message with a colliding id
                    // cannot complete a wait that no longer exists.
                    self.pending.lock().unwrap().remove(&id);
                    return Err(TransportError::Timeout {
                        ms: limit.as_millis() as u64,
                    });
                }
            },
            None => rx.await,
        };

        let response = received.map_err(|_| TransportError::Closed)??;
        response.into_result().map_err(TransportError::Rpc)
    }

    /// Ask the background task to close the socket and exit.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Close);
    }
}

/// Startup health probe: confirm a connection opens within `timeout`,
/// then close it. Lets startup fail fast instead of looping silently
/// against an unreachable endpoint.
pub async fn health_check(url: &str, timeout: Duration) -> Result<(), TransportError> {
    let ms = timeout.as_millis() as u64;
    let (mut ws, _) = time::timeout(timeout, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| TransportError::ConnectTimeout { ms })?
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;
    let _ = ws.close(None).await;
    Ok(())
}

/// Register a one-shot handler for `id`. Exactly one in-flight handler
/// per id: a duplicate is an error, never a silent overwrite.
fn register(pending: &PendingMap, id: &str, tx: ResponseSender) -> Result<(), TransportError> {
    let mut map = pending.lock().unwrap();
    if map.contains_key(id) {
        return Err(TransportError::DuplicateId(id.to_string()));
    }
    map.insert(id.to_string(), tx);
    Ok(())
}

/// Background task that owns the socket for the life of the session.
async fn ws_task(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    pending: PendingMap,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(Command::Close) => break,
                    Some(Command::Send(req)) => {
                        let Ok(text) = serde_json::to_string(&req) else {
                            continue;
                        };
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            // Socket is gone; drain and let callers fail fast
                            break;
                        }
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => handle_message(text.as_ref(), &pending),
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = sink.close().await;
    drain(&pending);
}

/// Dispatch one incoming frame to its registered handler, or log and
/// drop it when no handler matches.
fn handle_message(text: &str, pending: &PendingMap) {
    let Ok(response) = serde_json::from_str::<Response>(text) else {
        tracing::debug!("failed to parse frame as JSON-RPC response, dropped");
        return;
    };
    let Some(id) = response.id_str() else {
        tracing::debug!("response without id, dropped");
        return;
    };
    let handler = pending.lock().unwrap().remove(&id);
    match handler {
        Some(tx) => {
            let _ = tx.send(Ok(response));
        }
        None => tracing::debug!(id = %id, "unmatched response id, dropped"),
    }
}

/// Complete every outstanding request with a closed error.
fn drain(pending: &PendingMap) {
    for (_, tx) in pending.lock().unwrap().drain() {
        let _ = tx.send(Err(TransportError::Closed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_map() -> PendingMap {
        Arc::new(Mutex::new(HashMap::new()))
    }

    #[tokio::test]
    async fn correlated_response_reaches_handler_and_removes_it() {
        let pending = pending_map();
        let (tx, rx) = oneshot::channel();
        register(&pending, "query-height", tx).unwrap();

        handle_message(
            r#"{"jsonrpc":"2.0","id":"query-height","result":123}"#,
            &pending,
        );

        let resp = rx.await.unwrap().unwrap();
        assert_eq!(resp.into_result().unwrap(), serde_json::json!(123));
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmatched_id_is_dropped_not_fatal() {
        let pending = pending_map();
        let (tx, mut rx) = oneshot::channel();
        register(&pending, "expected", tx).unwrap();

        handle_message(r#"{"jsonrpc":"2.0","id":"unexpected","result":1}"#, &pending);

        // The registered handler is untouched
        assert!(rx.try_recv().is_err());
        assert_eq!(pending.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_id_rejected() {
        let pending = pending_map();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        register(&pending, "next-block/1", tx1).unwrap();
        let err = register(&pending, "next-block/1", tx2).unwrap_err();
        assert!(matches!(err, TransportError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn drain_completes_outstanding_requests_with_closed() {
        let pending = pending_map();
        let (tx, rx) = oneshot::channel();
        register(&pending, "in-flight", tx).unwrap();

        drain(&pending);

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_is_ignored() {
        let pending = pending_map();
        let (tx, mut rx) = oneshot::channel();
        register(&pending, "id", tx).unwrap();
        handle_message("not json at all", &pending);
        assert!(rx.try_recv().is_err());
        assert_eq!(pending.lock().unwrap().len(), 1);
    }
}
