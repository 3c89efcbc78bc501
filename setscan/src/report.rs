//! Run reports: presentation rows, run metadata and the run folder
//!
//! A run folder `<base_dir>/<YYYY-MM-DD_HH-MM-SS>/` (UTC) holds:
//! - `results.json`: rows as a pretty-printed JSON array
//! - `results.csv`: the same rows, header always present
//! - `meta.json`: run metadata
//! - `cache.sqlite`: snapshot of the chunk cache at the end of the run

use crate::aggregator::TrackAggregate;
use crate::db::ChunkCache;
use crate::scheduler::ScheduleStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use setscan_common::{time, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const RESULTS_JSON: &str = "results.json";
pub const RESULTS_CSV: &str = "results.csv";
pub const META_JSON: &str = "meta.json";
pub const CACHE_SNAPSHOT: &str = "cache.sqlite";

const CSV_HEADER: [&str; 9] = [
    "artist",
    "title",
    "track_id",
    "confidence",
    "support",
    "first_seen_sec",
    "last_seen_sec",
    "source_id",
    "source_file",
];

/// One identified track, as presented
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub artist: String,
    pub title: String,
    pub track_id: String,
    /// Rounded to 3 decimals
    pub confidence: f64,
    pub support: u32,
    /// Whole seconds (truncated)
    pub first_seen_sec: i64,
    pub last_seen_sec: i64,
    pub source_id: String,
    pub source_file: String,
}

/// Run-level context written next to the rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub source_id: String,
    pub audio_path: PathBuf,
    pub duration_sec: f64,
    pub chunk_seconds: f64,
    pub overlap_seconds: f64,
    pub sample_rate: u32,
    pub max_parallel_chunks: usize,
    pub distinct_tracks: usize,
    pub windows: usize,
    pub cache_hits: usize,
    pub oracle_calls: usize,
    pub skipped_windows: usize,
    pub created_utc: DateTime<Utc>,
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub rows: Vec<ReportRow>,
    pub meta: RunMetadata,
    pub stats: ScheduleStats,
}

/// Round to 3 decimals for presentation
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Convert ranked aggregates into presentation rows, keeping their order
pub fn build_rows(tracks: &[TrackAggregate], source_id: &str, source_file: &str) -> Vec<ReportRow> {
    tracks
        .iter()
        .map(|t| ReportRow {
            artist: t.artist.clone(),
            title: t.title.clone(),
            track_id: t.track_id.clone(),
            confidence: round3(t.confidence_max),
            support: t.support,
            first_seen_sec: t.first_seen_sec.trunc() as i64,
            last_seen_sec: t.last_seen_sec.trunc() as i64,
            source_id: source_id.to_string(),
            source_file: source_file.to_string(),
        })
        .collect()
}

/// Quote a CSV field when it contains a separator, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render rows as CSV (CRLF line endings)
pub fn render_csv(rows: &[ReportRow]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push_str("\r\n");

    for row in rows {
        let fields = [
            csv_field(&row.artist),
            csv_field(&row.title),
            csv_field(&row.track_id),
            row.confidence.to_string(),
            row.support.to_string(),
            row.first_seen_sec.to_string(),
            row.last_seen_sec.to_string(),
            csv_field(&row.source_id),
            csv_field(&row.source_file),
        ];
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }

    out
}

/// Writes run folders under a base directory
pub struct ReportWriter {
    base_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Folder for a run created at `created_utc`
    pub fn run_dir(&self, created_utc: DateTime<Utc>) -> PathBuf {
        self.base_dir.join(time::run_stamp(created_utc))
    }

    /// Write the report and a cache snapshot; returns the run folder
    pub async fn write(&self, report: &RunReport, cache: &ChunkCache) -> Result<PathBuf> {
        let run_dir = self.run_dir(report.meta.created_utc);
        fs::create_dir_all(&run_dir)?;

        write_json(&run_dir.join(RESULTS_JSON), &report.rows)?;
        fs::write(run_dir.join(RESULTS_CSV), render_csv(&report.rows))?;
        write_json(&run_dir.join(META_JSON), &report.meta)?;
        cache.snapshot_to(&run_dir.join(CACHE_SNAPSHOT)).await?;

        info!(
            run_dir = %run_dir.display(),
            rows = report.rows.len(),
            "Run report written"
        );

        Ok(run_dir)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        setscan_common::Error::Internal(format!("Serialize {} failed: {}", path.display(), e))
    })?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(track_id: &str, confidence: f64, first: f64, last: f64) -> TrackAggregate {
        TrackAggregate {
            track_id: track_id.to_string(),
            artist: "Artist".to_string(),
            title: "Title".to_string(),
            confidence_max: confidence,
            support: 2,
            first_seen_sec: first,
            last_seen_sec: last,
        }
    }

    #[test]
    fn test_rows_round_and_truncate() {
        let rows = build_rows(
            &[aggregate("T1", 2.0 / 3.0, 19.99, 40.5)],
            "abc123",
            "set.mp3",
        );
        assert_eq!(rows[0].confidence, 0.667);
        assert_eq!(rows[0].first_seen_sec, 19);
        assert_eq!(rows[0].last_seen_sec, 40);
        assert_eq!(rows[0].source_id, "abc123");
        assert_eq!(rows[0].source_file, "set.mp3");
    }

    #[test]
    fn test_rows_keep_ranking_order() {
        let rows = build_rows(
            &[aggregate("B", 1.0, 0.0, 0.0), aggregate("A", 0.5, 0.0, 0.0)],
            "x",
            "y",
        );
        let ids: Vec<&str> = rows.iter().map(|r| r.track_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn test_csv_header_only_when_empty() {
        assert_eq!(
            render_csv(&[]),
            "artist,title,track_id,confidence,support,first_seen_sec,last_seen_sec,source_id,source_file\r\n"
        );
    }

    #[test]
    fn test_csv_quoting() {
        let mut agg = aggregate("T1", 0.9, 0.0, 20.0);
        agg.artist = "Above & Beyond, Andrew Bayer".to_string();
        agg.title = "Say \"Hello\"".to_string();
        let csv = render_csv(&build_rows(&[agg], "vid", "set.mp3"));

        let line = csv.lines().nth(1).unwrap();
        assert_eq!(
            line,
            "\"Above & Beyond, Andrew Bayer\",\"Say \"\"Hello\"\"\",T1,0.9,2,0,20,vid,set.mp3"
        );
    }

    #[test]
    fn test_run_dir_stamp() {
        use chrono::TimeZone;
        let writer = ReportWriter::new("runs");
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            writer.run_dir(at),
            PathBuf::from("runs").join("2025-03-14_09-26-53")
        );
    }
}
