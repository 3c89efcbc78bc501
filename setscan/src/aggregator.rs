//! Track aggregation
//!
//! Folds per-chunk results (in completion order) into one aggregate per track.
//! The aggregator is owned by a single consumer; chunk tasks never touch it.

use crate::types::ChunkResult;
use std::collections::HashMap;

/// Independent hits needed for full derived confidence
const SATURATING_SUPPORT: f64 = 3.0;

/// Running evidence for one track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackAggregate {
    pub track_id: String,
    pub artist: String,
    pub title: String,
    /// Best of the oracle's own confidences and the support-derived confidence
    pub confidence_max: f64,
    /// Number of chunks that matched this track (>= 1)
    pub support: u32,
    pub first_seen_sec: f64,
    pub last_seen_sec: f64,
}

/// Confidence earned from repeated independent matches: `min(1, support / 3)`
pub fn derived_confidence(support: u32) -> f64 {
    (support as f64 / SATURATING_SUPPORT).min(1.0)
}

/// Per-run track aggregator
///
/// Aggregates are kept in order of first appearance; that order breaks ties
/// when finalizing.
#[derive(Debug, Default)]
pub struct TrackAggregator {
    index: HashMap<String, usize>,
    tracks: Vec<TrackAggregate>,
    applied: usize,
    discarded: usize,
}

impl TrackAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk result in; results without a match are discarded
    pub fn apply(&mut self, result: ChunkResult) {
        let Some(matched) = result.matched else {
            self.discarded += 1;
            return;
        };
        self.applied += 1;

        let start = result.window.start;

        let existing = self.index.get(&matched.track_id).copied();
        let agg = match existing {
            Some(idx) => {
                let agg = &mut self.tracks[idx];
                agg.support += 1;
                agg.first_seen_sec = agg.first_seen_sec.min(start);
                agg.last_seen_sec = agg.last_seen_sec.max(start);
                if let Some(raw) = matched.confidence {
                    agg.confidence_max = agg.confidence_max.max(raw);
                }
                agg
            }
            None => {
                tracing::debug!(
                    track_id = %matched.track_id,
                    artist = %matched.artist,
                    title = %matched.title,
                    start,
                    "New track identified"
                );
                self.index.insert(matched.track_id.clone(), self.tracks.len());
                self.tracks.push(TrackAggregate {
                    track_id: matched.track_id,
                    artist: matched.artist,
                    title: matched.title,
                    confidence_max: matched.confidence.unwrap_or(0.0),
                    support: 1,
                    first_seen_sec: start,
                    last_seen_sec: start,
                });
                let last = self.tracks.len() - 1;
                &mut self.tracks[last]
            }
        };

        agg.confidence_max = agg.confidence_max.max(derived_confidence(agg.support));
    }

    /// Number of distinct tracks seen so far
    pub fn distinct_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Results that carried a match
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Results without a match
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Final ranking: confidence descending, then support descending
    ///
    /// The sort is stable, so ties keep first-appearance order.
    pub fn finalize(self) -> Vec<TrackAggregate> {
        let mut tracks = self.tracks;
        tracks.sort_by(|a, b| {
            b.confidence_max
                .total_cmp(&a.confidence_max)
                .then_with(|| b.support.cmp(&a.support))
        });
        tracks
    }
}
