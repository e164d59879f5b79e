//! Supervisor behavior against a scripted loopback node: bounded
//! negotiation retries and cursor-anchored renegotiation after a
//! mid-stream disconnect.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use cip60_core::{
    AssetStore, BlockPipeline, CanonicalRecord, CheckpointManager, CheckpointStore, Cursor,
    IndexerError, ProgressFeed,
};
use cip60_ogmios::{ChainSync, SyncConfig};

struct NullAssets;

#[async_trait]
impl AssetStore for NullAssets {
    async fn upsert(&self, _record: &CanonicalRecord) -> Result<(), IndexerError> {
        Ok(())
    }
}

struct NullCheckpoints;

#[async_trait]
impl CheckpointStore for NullCheckpoints {
    async fn load(&self) -> Result<Option<Cursor>, IndexerError> {
        Ok(None)
    }
    async fn save(&self, _cursor: &Cursor) -> Result<(), IndexerError> {
        Ok(())
    }
}

fn pipeline(cursor: Cursor) -> BlockPipeline {
    BlockPipeline::new(
        cursor,
        Arc::new(NullAssets),
        CheckpointManager::new(Arc::new(NullCheckpoints), 1_000_000),
        ProgressFeed::default(),
    )
}

/// Short delays throughout so a full connect → fail → reconnect cycle
/// fits comfortably inside a test.
fn sync_config(url: String) -> SyncConfig {
    let mut config = SyncConfig::new(url);
    config.connection.request_timeout = Duration::from_millis(500);
    config.reconnect_base = Duration::from_millis(20);
    config.reconnect_cap = Duration::from_millis(100);
    config.negotiation_retry_delay = Duration::from_millis(10);
    config
}

async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

fn ok_response(req: &Value, result: Value) -> Message {
    Message::Text(
        json!({ "jsonrpc": "2.0", "id": req["id"], "result": result })
            .to_string()
            .into(),
    )
}

#[tokio::test]
async fn negotiation_retries_are_bounded_then_force_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let server_attempts = attempts.clone();

    // Two sessions, each answering every findIntersection with an error
    // envelope: the first session must fail after the bounded retries
    // and force a reconnect into the second.
    tokio::spawn(async move {
        for _ in 0..2 {
            let ws = accept_ws(&listener).await;
            let (mut sink, mut stream) = ws.split();
            while let Some(Ok(Message::Text(text))) = stream.next().await {
                let req: Value = serde_json::from_str(text.as_ref()).unwrap();
                let resp = if req["method"] == "findIntersection" {
                    server_attempts.fetch_add(1, Ordering::SeqCst);
                    Message::Text(
                        json!({
                            "jsonrpc": "2.0",
                            "id": req["id"],
                            "error": { "code": 1000, "message": "intersection not found" }
                        })
                        .to_string()
                        .into(),
                    )
                } else {
                    ok_response(&req, json!(10_500_000))
                };
                if sink.send(resp).await.is_err() {
                    break;
                }
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync = ChainSync::new(
        sync_config(format!("ws://{addr}")),
        pipeline(Cursor::fallback()),
        shutdown_rx,
    );
    let handle = tokio::spawn(sync.run());

    // Both sessions exhaust their three attempts
    time::timeout(Duration::from_secs(5), async {
        while attempts.load(Ordering::SeqCst) < 6 {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("negotiation attempts never arrived");

    // No further session can open, so the count must hold exactly
    time::sleep(Duration::from_millis(100)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 6);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn reconnect_renegotiates_from_last_processed_cursor() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (points_tx, mut points_rx) = mpsc::unbounded_channel::<Value>();

    tokio::spawn(async move {
        // Session 1: negotiate, serve one block, then drop the socket
        let ws = accept_ws(&listener).await;
        let (mut sink, mut stream) = ws.split();
        while let Some(Ok(Message::Text(text))) = stream.next().await {
            let req: Value = serde_json::from_str(text.as_ref()).unwrap();
            match req["method"].as_str().unwrap() {
                "findIntersection" => {
                    let _ = points_tx.send(req["params"]["points"].clone());
                    let _ = sink
                        .send(ok_response(&req, json!({ "intersection": "found" })))
                        .await;
                }
                "nextBlock" => {
                    let block = json!({
                        "block": { "slot": 60_000_000u64, "id": "hash60", "transactions": [] }
                    });
                    let _ = sink.send(ok_response(&req, block)).await;
                    break;
                }
                _ => {
                    let _ = sink.send(ok_response(&req, json!(10_500_000))).await;
                }
            }
        }
        drop(sink);
        drop(stream);

        // Session 2: capture the renegotiation points, then swallow
        // nextBlock so the stream idles until shutdown
        let ws = accept_ws(&listener).await;
        let (mut sink, mut stream) = ws.split();
        while let Some(Ok(Message::Text(text))) = stream.next().await {
            let req: Value = serde_json::from_str(text.as_ref()).unwrap();
            match req["method"].as_str().unwrap() {
                "findIntersection" => {
                    let _ = points_tx.send(req["params"]["points"].clone());
                    let _ = sink
                        .send(ok_response(&req, json!({ "intersection": "found" })))
                        .await;
                }
                "nextBlock" => {}
                _ => {
                    let _ = sink.send(ok_response(&req, json!(10_500_000))).await;
                }
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync = ChainSync::new(
        sync_config(format!("ws://{addr}")),
        pipeline(Cursor::fallback()),
        shutdown_rx,
    );
    let handle = tokio::spawn(sync.run());

    // First negotiation leads with the fallback cursor
    let first = time::timeout(Duration::from_secs(5), points_rx.recv())
        .await
        .expect("first negotiation never arrived")
        .unwrap();
    assert_eq!(first[0]["slot"], 52_876_752);

    // After the drop, renegotiation leads with the processed block's
    // position, not the fallback and not where the stream broke
    let second = time::timeout(Duration::from_secs(5), points_rx.recv())
        .await
        .expect("renegotiation never arrived")
        .unwrap();
    assert_eq!(second[0]["slot"], 60_000_000);
    assert_eq!(second[0]["id"], "hash60");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}
