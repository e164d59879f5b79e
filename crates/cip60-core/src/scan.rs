//! Recursive scan of transaction metadata trees for tagged CIP-60 payloads.
//!
//! Transaction metadata is an arbitrarily nested, untyped key→value tree.
//! A subtree is a tagged payload when it carries the version marker field;
//! it is actionable when its path contains the `721` metadata label
//! followed by at least two further segments (policy id, then asset name).

use serde_json::Value;

/// Field identifying a subtree as a CIP-60 music-token payload.
pub const VERSION_KEY: &str = "music_metadata_version";

/// The transaction-metadata label under which token metadata lives.
pub const METADATA_LABEL: &str = "721";

/// A metadata subtree carrying the version marker, plus the key path
/// that led to it.
#[derive(Debug, Clone)]
pub struct TaggedPayload {
    pub path: Vec<String>,
    pub payload: Value,
}

/// Depth-first search for tagged payloads.
///
/// Descent stops at the first subtree containing [`VERSION_KEY`] — the
/// whole subtree is the payload, and nothing below it is scanned again.
/// Array elements contribute their index as a path segment so that
/// label lists keep their positional context.
pub fn find_tagged_payloads(metadata: &Value) -> Vec<TaggedPayload> {
    let mut found = Vec::new();
    walk(metadata, &mut Vec::new(), &mut found);
    found
}

fn walk(value: &Value, path: &mut Vec<String>, found: &mut Vec<TaggedPayload>) {
    match value {
        Value::Object(map) => {
            if map.contains_key(VERSION_KEY) {
                found.push(TaggedPayload {
                    path: path.clone(),
                    payload: value.clone(),
                });
                return;
            }
            for (key, child) in map {
                path.push(key.clone());
                walk(child, path, found);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                path.push(idx.to_string());
                walk(child, path, found);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Resolve the (policy id, asset name) pair from a payload path.
///
/// The two segments immediately after the `721` label are the policy id
/// and asset name; a path with fewer than two segments after the label
/// yields no location and the payload is not actionable.
pub fn asset_location(path: &[String]) -> Option<(String, String)> {
    let idx = path.iter().position(|seg| seg == METADATA_LABEL)?;
    let policy_id = path.get(idx + 1)?;
    let asset_name = path.get(idx + 2)?;
    Some((policy_id.clone(), asset_name.clone()))
}
