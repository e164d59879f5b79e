//! Metadata normalizer — maps the three observed CIP-60 payload schema
//! versions onto one canonical record shape.
//!
//! Pure field-path remapping: each version nests release/song/artist
//! fields differently, and this module is the only place that knows the
//! differences. Adding a version means adding one extractor function and
//! one match arm.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scan::VERSION_KEY;

/// Sentinel for artist entries that carry no resolvable name.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// A credited artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isni: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
}

impl Artist {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            isni: None,
            links: None,
        }
    }
}

/// Copyright attribution. A bare string in the payload expands to both
/// fields set to that string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Copyright {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composition: Option<String>,
}

/// The canonical, version-independent shape of a music-token payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMetadata {
    pub title: String,
    pub artists: Vec<Artist>,
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<Copyright>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iswc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub is_explicit: bool,
    pub is_ai_generated: bool,
}

/// The payload's version marker as a `u64`, accepting both numeric and
/// string encodings.
pub fn version_of(payload: &Value) -> Option<u64> {
    match payload.get(VERSION_KEY)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The version marker rendered for storage (`"1"` / `"2"` / `"3"`), or
/// `"unknown"` when absent or unparseable.
pub fn version_label(payload: &Value) -> String {
    match version_of(payload) {
        Some(v) => v.to_string(),
        None => "unknown".to_string(),
    }
}

/// Normalize a tagged payload into the canonical shape.
///
/// Returns `None` for an unknown or missing version marker — the caller
/// stores the raw payload as a best-effort record instead of failing.
pub fn normalize(payload: &Value) -> Option<NormalizedMetadata> {
    match version_of(payload)? {
        1 => Some(extract_v1(payload)),
        2 => Some(extract_v2(payload)),
        3 => Some(extract_v3(payload)),
        _ => None,
    }
}

// ─── Per-version extractors ──────────────────────────────────────────────────

fn extract_v3(m: &Value) -> NormalizedMetadata {
    let mut out = base(m);

    if let Some(release) = m.get("release") {
        out.release_type = string_field(release, "release_type");
        out.release_title = string_field(release, "release_title");
        if let Some(artists) = release.get("artists").and_then(Value::as_array) {
            merge_artists(&mut out.artists, artists.iter().map(artist_from));
        }
        if let Some(c) = release.get("copyright") {
            out.copyright = copyright_of(c);
        }
        out.genres = string_list(release.get("genres"));
    }

    if let Some(file) = first_file(m) {
        let song = file.get("song").cloned().unwrap_or(Value::Null);

        out.title = string_field(&song, "song_title")
            .or_else(|| string_field(file, "name"))
            .unwrap_or_default();
        out.duration = string_field(&song, "song_duration");
        out.track_number = song.get("track_number").and_then(Value::as_u64);
        out.media_type = string_field(file, "mediaType");
        out.src = src_of(file);
        out.is_explicit = truthy(song.get("explicit"));
        out.is_ai_generated = truthy(song.get("ai_generated"));
        out.isrc = string_field(&song, "isrc");
        out.iswc = string_field(&song, "iswc");

        // Release-level genres take precedence over track-level ones
        if out.genres.is_empty() {
            out.genres = string_list(song.get("genres"));
        }
        if let Some(artists) = song.get("artists").and_then(Value::as_array) {
            merge_artists(&mut out.artists, artists.iter().map(artist_from));
        }
        if out.copyright.is_none() {
            if let Some(c) = song.get("copyright") {
                out.copyright = copyright_of(c);
            }
        }
    }

    out
}

fn extract_v2(m: &Value) -> NormalizedMetadata {
    let mut out = base(m);

    if let Some(release) = m.get("release") {
        out.release_title = string_field(release, "release_title");
        if let Some(c) = release.get("copyright") {
            out.copyright = copyright_of(c);
        }
    }
    out.release_type = string_field(m, "release_type").or_else(|| Some("Single".into()));

    if let Some(file) = first_file(m) {
        let song = file.get("song").cloned().unwrap_or(Value::Null);

        out.title = string_field(&song, "song_title")
            .or_else(|| string_field(file, "name"))
            .unwrap_or_default();
        out.duration = string_field(&song, "song_duration");
        out.track_number = song.get("track_number").and_then(Value::as_u64);
        out.media_type = string_field(file, "mediaType");
        out.src = src_of(file);
        out.is_explicit = truthy(song.get("explicit"));
        out.is_ai_generated = truthy(song.get("ai_generated"));
        out.genres = string_list(song.get("genres"));
        if let Some(artists) = song.get("artists").and_then(Value::as_array) {
            merge_artists(&mut out.artists, artists.iter().map(artist_from));
        }
        if out.copyright.is_none() {
            if let Some(c) = song.get("copyright") {
                out.copyright = copyright_of(c);
            }
        }
    }

    out
}

fn extract_v1(m: &Value) -> NormalizedMetadata {
    let mut out = base(m);

    out.release_type = string_field(m, "release_type").or_else(|| Some("Single".into()));
    out.release_title = string_field(m, "album_title");
    if let Some(c) = m.get("copyright") {
        out.copyright = copyright_of(c);
    }
    if let Some(artists) = m.get("artists").and_then(Value::as_array) {
        merge_artists(&mut out.artists, artists.iter().map(artist_from));
    }
    out.genres = string_list(m.get("genres"));

    // Singles carry the song fields at the top level
    if out.release_type.as_deref() == Some("Single") {
        out.title = string_field(m, "song_title").unwrap_or_default();
        out.duration = string_field(m, "song_duration");
        out.track_number = m.get("track_number").and_then(Value::as_u64);
    }

    if let Some(file) = first_file(m) {
        if out.title.is_empty() {
            out.title = string_field(file, "song_title")
                .or_else(|| string_field(file, "name"))
                .unwrap_or_default();
        }
        out.media_type = string_field(file, "mediaType");
        out.src = src_of(file);
        if let Some(artists) = file.get("artists").and_then(Value::as_array) {
            merge_artists(&mut out.artists, artists.iter().map(artist_from));
        }
    }

    out
}

// ─── Field helpers ───────────────────────────────────────────────────────────

fn base(m: &Value) -> NormalizedMetadata {
    NormalizedMetadata {
        cover_image: string_field(m, "image"),
        ..Default::default()
    }
}

fn first_file(m: &Value) -> Option<&Value> {
    m.get("files").and_then(Value::as_array)?.first()
}

fn string_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Track sources appear either as a bare URI or a one-element array.
fn src_of(file: &Value) -> Option<String> {
    match file.get("src")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// JSON truthiness as the payloads use it (flags are written as booleans,
/// strings, or numbers interchangeably in the wild).
fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty() && s != "false",
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn copyright_of(v: &Value) -> Option<Copyright> {
    match v {
        Value::String(s) => Some(Copyright {
            master: Some(s.clone()),
            composition: Some(s.clone()),
        }),
        Value::Object(map) => Some(Copyright {
            master: map.get("master").and_then(Value::as_str).map(str::to_string),
            composition: map
                .get("composition")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        _ => None,
    }
}

/// Normalize one artist entry. Entries appear as plain strings, objects
/// with a `name` field, or single-key objects whose key is the name. An
/// object with no resolvable name maps to the unknown sentinel rather
/// than being dropped.
fn artist_from(v: &Value) -> Artist {
    match v {
        Value::String(s) => Artist::named(s.clone()),
        Value::Object(map) => {
            if let Some(name) = map.get("name").and_then(Value::as_str) {
                return Artist {
                    name: name.to_string(),
                    isni: map.get("isni").and_then(Value::as_str).map(str::to_string),
                    links: map.get("links").cloned(),
                };
            }
            match map.iter().next() {
                Some((name, details)) => Artist {
                    name: name.clone(),
                    isni: None,
                    links: details.get("links").cloned(),
                },
                None => Artist::named(UNKNOWN_ARTIST),
            }
        }
        _ => Artist::named(UNKNOWN_ARTIST),
    }
}

/// Append artists not already present, deduplicated by name and keeping
/// first-seen order.
fn merge_artists(dst: &mut Vec<Artist>, src: impl Iterator<Item = Artist>) {
    for artist in src {
        if !dst.iter().any(|a| a.name == artist.name) {
            dst.push(artist);
        }
    }
}
