//! Resume cursor — tracks the newest fully processed block, and builds
//! the intersection candidate set offered to the node on (re)connect.

use serde::{Deserialize, Serialize};

/// A chain point as understood by the node: slot number plus block hash.
///
/// Serializes with the field name `id` for the hash, matching the
/// `findIntersection` wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub slot: u64,
    pub id: String,
}

/// Known hard-fork transition points on mainnet, oldest first.
///
/// Used only as fallback intersection candidates: if the node no longer
/// recognizes our exact cursor hash (deep rollback past the retained
/// window), negotiation can still land on the newest era boundary below
/// it instead of failing permanently.
pub const ERA_BOUNDARIES: &[(u64, &str)] = &[
    (4_492_799, "f8084c61b6a238acec985b59310b6ecec49c0ab8352249afd7268da5cff2a457"),
    (16_588_737, "4e9bbbb67e3ae262133d94c3da5bffce7b1127fc436e7433b87668dba34c354a"),
    (23_068_793, "69c44ac1dda2ec74646e4223bc804d9126f719b1c245dadc2ad65e8de1b276d7"),
    (39_916_796, "e72579ff89dc9ed325b723a33624b596c08141c7bd573ecfff56a1f7229e4d09"),
    (72_316_796, "c58a24ba8203e7629422a24d9dc68ce2ed495420bf40d9dab124373655161a20"),
    (133_660_799, "e757d57eb8dc9500a61c60a39fadb63d9be6973ba96ae337fd24453d4d15c343"),
];

/// Starting point used when no checkpoint exists yet (Allegra boundary —
/// CIP-60 tokens cannot predate it).
pub const FALLBACK_SLOT: u64 = 52_876_752;
pub const FALLBACK_HASH: &str =
    "af192981f47a4150b4d4f96e2184050699febbbc31de18c3815bb5f338578ff6";

/// The indexer's current position in the chain.
///
/// Invariant: `slot` is monotonically non-decreasing across the process
/// lifetime, and only advances once a block has been fully scanned and
/// all of its records stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub slot: u64,
    pub block_hash: String,
}

impl Cursor {
    /// Create a cursor at the given position.
    pub fn new(slot: u64, block_hash: impl Into<String>) -> Self {
        Self {
            slot,
            block_hash: block_hash.into(),
        }
    }

    /// The hardcoded fallback position used on a fresh start.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_SLOT, FALLBACK_HASH)
    }

    /// Advance to a newer block. A slot below the current one is ignored
    /// so the cursor can never move backwards.
    pub fn advance(&mut self, slot: u64, block_hash: impl Into<String>) {
        if slot < self.slot {
            tracing::debug!(slot, current = self.slot, "ignoring backwards cursor advance");
            return;
        }
        self.slot = slot;
        self.block_hash = block_hash.into();
    }

    /// Build the intersection candidate set for negotiation: this cursor
    /// plus every era boundary strictly below it, sorted descending by
    /// slot (the node picks the newest point it recognizes).
    pub fn intersection_points(&self) -> Vec<Point> {
        let mut points = vec![Point {
            slot: self.slot,
            id: self.block_hash.clone(),
        }];
        for &(slot, hash) in ERA_BOUNDARIES {
            if slot < self.slot {
                points.push(Point {
                    slot,
                    id: hash.to_string(),
                });
            }
        }
        points.sort_by(|a, b| b.slot.cmp(&a.slot));
        points
    }
}
