//! Core data types shared by the planner, cache, gateway, scheduler and aggregator
//!
//! - [`Window`]: one planned time span of the source recording
//! - [`ChunkKey`]: content-addressed cache key of a window's clip
//! - [`OracleMatch`]: fields extracted from an oracle response (possibly incomplete)
//! - [`MatchRecord`]: a usable match (track id, artist and title all present)
//! - [`ChunkResult`]: a window paired with its match, if any

use serde::{Deserialize, Serialize};
use std::fmt;

/// A planned time window of the source recording
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Offset from the start of the recording (seconds, >= 0)
    pub start: f64,
    /// Window length (seconds, > 0)
    pub length: f64,
}

impl Window {
    pub fn new(start: f64, length: f64) -> Self {
        Self { start, length }
    }

    pub fn end(&self) -> f64 {
        self.start + self.length
    }
}

/// Cache key identifying a chunk by source content, window and clip sample rate
///
/// Two equal keys always decode to byte-identical oracle input, so key
/// equality is treated as content equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey(String);

impl ChunkKey {
    /// Derive the key from the source content hash and window parameters
    ///
    /// Positions are rounded to centiseconds so float noise cannot split keys.
    pub fn derive(source_hash: &str, window: &Window, sample_rate: u32) -> Self {
        Self(format!(
            "{}:{:.2}:{:.2}:{}",
            source_hash, window.start, window.length, sample_rate
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields extracted from a single oracle response
///
/// Any field may be missing; this is what gets cached. Whether the record is
/// usable is decided by [`OracleMatch::into_record`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleMatch {
    pub track_id: Option<String>,
    pub artist: Option<String>,
    pub title: Option<String>,
    /// Normalized to [0, 1] when present
    pub confidence: Option<f64>,
}

impl OracleMatch {
    /// Convert to a usable match; `None` when track id, artist or title is missing or blank
    pub fn into_record(self) -> Option<MatchRecord> {
        let track_id = non_blank(self.track_id)?;
        let artist = non_blank(self.artist)?;
        let title = non_blank(self.title)?;
        Some(MatchRecord {
            track_id,
            artist,
            title,
            confidence: self.confidence,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A usable identification of one real-world track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Opaque, stable per real-world track
    pub track_id: String,
    pub artist: String,
    pub title: String,
    pub confidence: Option<f64>,
}

/// Outcome of one window
///
/// `matched == None` covers both "oracle found nothing" and "oracle call failed".
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    pub window: Window,
    pub matched: Option<MatchRecord>,
}
