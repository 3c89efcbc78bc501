//! Identification run
//!
//! **Flow:** validate → probe duration → plan windows → hash source →
//! schedule chunks (single aggregation consumer) → rank → report.
//!
//! Invalid parameters and a missing source abort before any work starts.
//! A cancelled run returns [`Error::Cancelled`] and produces no report; the
//! cache keeps everything finished so far.

use crate::aggregator::TrackAggregator;
use crate::audio::ClipSource;
use crate::db::ChunkCache;
use crate::gateway::RecognitionGateway;
use crate::planner;
use crate::report::{build_rows, RunMetadata, RunReport};
use crate::scheduler::{ChunkScheduler, SchedulerSettings};
use crate::source::SourceAudio;
use setscan_common::{time, Error, Result, TomlConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Results buffered between the scheduler and the aggregator
const RESULT_CHANNEL_CAPACITY: usize = 256;

/// Parameters of one identification run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub chunk_seconds: f64,
    pub overlap_seconds: f64,
    pub sample_rate: u32,
    pub concurrency_limit: usize,
    pub batch_size: usize,
}

impl RunSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            chunk_seconds: config.audio.chunk_seconds as f64,
            overlap_seconds: config.audio.overlap_seconds as f64,
            sample_rate: config.audio.sample_rate,
            concurrency_limit: config.pipeline.max_parallel_chunks,
            batch_size: config.pipeline.batch_size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.chunk_seconds.is_finite() || self.chunk_seconds <= 0.0 {
            return Err(Error::Config(format!(
                "Chunk length must be positive, got {}",
                self.chunk_seconds
            )));
        }
        if !self.overlap_seconds.is_finite() || self.overlap_seconds < 0.0 {
            return Err(Error::Config(format!(
                "Overlap must not be negative, got {}",
                self.overlap_seconds
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::Config("Sample rate must be positive".to_string()));
        }
        if self.concurrency_limit == 0 {
            return Err(Error::Config("Concurrency limit must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("Batch size must be at least 1".to_string()));
        }
        Ok(())
    }

    fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            concurrency_limit: self.concurrency_limit,
            batch_size: self.batch_size,
            sample_rate: self.sample_rate,
        }
    }
}

/// What to analyze and how
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source_id: String,
    pub audio_path: PathBuf,
    pub settings: RunSettings,
}

/// Identify the tracks in one recording
pub async fn run_identification(
    request: &RunRequest,
    cache: &ChunkCache,
    gateway: Arc<RecognitionGateway>,
    clips: Arc<dyn ClipSource>,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    let settings = &request.settings;
    settings.validate()?;

    if !request.audio_path.is_file() {
        return Err(Error::InvalidInput(format!(
            "Source audio not found: {}",
            request.audio_path.display()
        )));
    }

    let duration = probe(&clips, request.audio_path.clone()).await?;
    if !duration.is_finite() || duration < 0.0 {
        return Err(Error::InvalidInput(format!(
            "Invalid duration {} for {}",
            duration,
            request.audio_path.display()
        )));
    }

    let windows = planner::plan(duration, settings.chunk_seconds, settings.overlap_seconds);
    info!(
        source_id = %request.source_id,
        duration_sec = duration,
        windows = windows.len(),
        chunk_seconds = settings.chunk_seconds,
        overlap_seconds = settings.overlap_seconds,
        "Planned windows"
    );

    let source = SourceAudio::open(&request.audio_path).await?;
    info!(hash = %source.content_hash, "Hashed source audio");

    let scheduler = ChunkScheduler::new(
        cache.clone(),
        gateway,
        clips,
        settings.scheduler_settings(),
    )?;

    // Single owner of the aggregates; chunk tasks only send results
    let (tx, mut rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
    let consumer = tokio::spawn(async move {
        let mut aggregator = TrackAggregator::new();
        while let Some(result) = rx.recv().await {
            aggregator.apply(result);
        }
        aggregator
    });

    let scheduled = scheduler.run(&source, &windows, tx, cancel).await;
    let aggregator = consumer
        .await
        .map_err(|e| Error::Internal(format!("Aggregation task failed: {}", e)))?;
    let stats = scheduled?;

    if stats.cancelled {
        return Err(Error::Cancelled);
    }

    let distinct_tracks = aggregator.distinct_tracks();
    info!(
        windows = stats.windows,
        cache_hits = stats.cache_hits,
        oracle_calls = stats.oracle_calls,
        matches = aggregator.applied(),
        skipped = stats.skipped,
        distinct_tracks,
        "Identification complete"
    );

    let tracks = aggregator.finalize();
    let rows = build_rows(&tracks, &request.source_id, &source.file_name());

    let meta = RunMetadata {
        source_id: request.source_id.clone(),
        audio_path: request.audio_path.clone(),
        duration_sec: duration,
        chunk_seconds: settings.chunk_seconds,
        overlap_seconds: settings.overlap_seconds,
        sample_rate: settings.sample_rate,
        max_parallel_chunks: settings.concurrency_limit,
        distinct_tracks,
        windows: stats.windows,
        cache_hits: stats.cache_hits,
        oracle_calls: stats.oracle_calls,
        skipped_windows: stats.skipped,
        created_utc: time::now(),
    };

    Ok(RunReport { rows, meta, stats })
}

async fn probe(clips: &Arc<dyn ClipSource>, path: PathBuf) -> Result<f64> {
    let clips = Arc::clone(clips);
    tokio::task::spawn_blocking(move || clips.duration(&path))
        .await
        .map_err(|e| Error::Internal(format!("Duration probe task failed: {}", e)))?
        .map_err(|e| Error::Audio(format!("Failed to probe duration: {:#}", e)))
}
