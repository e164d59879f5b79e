//! One-way sync-progress feed.
//!
//! The pipeline publishes a progress sample for every block that carries
//! a network tip; the API/dashboard layer owns actual delivery. With no
//! subscribers, publishing is a no-op.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A progress sample: how far the indexer is versus the network tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub current_slot: u64,
    pub network_tip: u64,
}

impl SyncProgress {
    /// Sync completion in `[0.0, 1.0]`.
    pub fn ratio(&self) -> f64 {
        if self.network_tip == 0 {
            return 0.0;
        }
        self.current_slot as f64 / self.network_tip as f64
    }
}

/// Broadcast fan-out for progress samples.
#[derive(Debug, Clone)]
pub struct ProgressFeed {
    tx: broadcast::Sender<SyncProgress>,
}

impl ProgressFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a sample to all current subscribers. Lagging or absent
    /// subscribers are not an error.
    pub fn publish(&self, progress: SyncProgress) {
        let _ = self.tx.send(progress);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncProgress> {
        self.tx.subscribe()
    }
}

impl Default for ProgressFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let feed = ProgressFeed::default();
        feed.publish(SyncProgress {
            current_slot: 1,
            network_tip: 2,
        });
    }

    #[tokio::test]
    async fn subscribers_receive_samples() {
        let feed = ProgressFeed::default();
        let mut rx = feed.subscribe();
        feed.publish(SyncProgress {
            current_slot: 50,
            network_tip: 100,
        });
        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.current_slot, 50);
        assert!((sample.ratio() - 0.5).abs() < f64::EPSILON);
    }
}
