//! Chunk scheduler
//!
//! For every planned window: cache lookup → (on miss) clip extraction →
//! throttled oracle call → cache write → result out on the channel.
//!
//! # Concurrency
//! - Windows are submitted in groups; a group is driven with
//!   `futures::stream::buffer_unordered` and fully drained before the next
//!   one starts, which bounds the number of clips held in memory.
//! - Only oracle calls take a slot from the shared semaphore. Cache access and
//!   clip extraction are not throttled.
//! - Results are sent as they complete, so their order is not window order.
//!
//! # Error Handling
//! - Cache errors: handled inside [`ChunkCache`] (miss / dropped write)
//! - Oracle errors: normalized to "no match" by the gateway, then cached
//! - Clip extraction errors: the window is skipped and not cached
//! - Cancellation: no new groups start, pending oracle waits are abandoned
//!   without writing the cache

use crate::audio::{AudioClip, ClipSource};
use crate::db::chunk_cache::{CachedPayload, ChunkCache};
use crate::gateway::RecognitionGateway;
use crate::source::SourceAudio;
use crate::types::{ChunkKey, ChunkResult, OracleMatch, Window};
use futures::stream::{self, StreamExt};
use setscan_common::{Error, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scheduling limits
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Maximum oracle calls in flight at once (>= 1)
    pub concurrency_limit: usize,
    /// Windows per submission group (>= 1)
    pub batch_size: usize,
    /// Clip sample rate, part of every chunk key
    pub sample_rate: u32,
}

/// Counters for one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    pub windows: usize,
    /// Windows that produced a result (hit or oracle call)
    pub processed: usize,
    pub cache_hits: usize,
    pub oracle_calls: usize,
    /// Results carrying a usable match
    pub matches: usize,
    /// Windows dropped because their clip could not be extracted
    pub skipped: usize,
    /// Cancellation left at least one window unprocessed
    pub cancelled: bool,
}

#[derive(Default)]
struct Counters {
    processed: AtomicUsize,
    cache_hits: AtomicUsize,
    oracle_calls: AtomicUsize,
    matches: AtomicUsize,
    skipped: AtomicUsize,
}

enum WindowOutcome {
    Done(ChunkResult),
    Skipped,
    Cancelled,
}

/// Drives planned windows through cache, clip extraction and the oracle
pub struct ChunkScheduler {
    cache: ChunkCache,
    gateway: Arc<RecognitionGateway>,
    clips: Arc<dyn ClipSource>,
    oracle_slots: Arc<Semaphore>,
    settings: SchedulerSettings,
}

impl ChunkScheduler {
    pub fn new(
        cache: ChunkCache,
        gateway: Arc<RecognitionGateway>,
        clips: Arc<dyn ClipSource>,
        settings: SchedulerSettings,
    ) -> Result<Self> {
        if settings.concurrency_limit == 0 {
            return Err(Error::Config("concurrency limit must be at least 1".to_string()));
        }
        if settings.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".to_string()));
        }

        Ok(Self {
            cache,
            gateway,
            clips,
            oracle_slots: Arc::new(Semaphore::new(settings.concurrency_limit)),
            settings,
        })
    }

    /// Process every window, sending each result on `results` as it completes
    ///
    /// Returns once all windows are done (or the run is cancelled). Dropping
    /// `results` at return closes the channel for the consumer.
    pub async fn run(
        &self,
        source: &SourceAudio,
        windows: &[Window],
        results: mpsc::Sender<ChunkResult>,
        cancel: &CancellationToken,
    ) -> Result<ScheduleStats> {
        let total = windows.len();
        let counters = Counters::default();
        // A group smaller than the slot count would leave slots idle
        let group_size = self.settings.batch_size.max(self.settings.concurrency_limit);

        info!(
            windows = total,
            concurrency_limit = self.settings.concurrency_limit,
            group_size,
            "Scheduling chunks"
        );

        let mut submitted = 0usize;
        // Set only when some window was left unfinished
        let mut cancelled = false;
        for group in windows.chunks(group_size) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let mut outcomes = stream::iter(group.iter())
                .map(|window| self.process_window(source, *window, &counters, cancel))
                .buffer_unordered(group.len());

            while let Some(outcome) = outcomes.next().await {
                match outcome {
                    WindowOutcome::Done(result) => {
                        results
                            .send(result)
                            .await
                            .map_err(|_| Error::Internal("Result consumer dropped".to_string()))?;
                    }
                    WindowOutcome::Cancelled => cancelled = true,
                    WindowOutcome::Skipped => {}
                }
            }

            submitted += group.len();
            let hits = counters.cache_hits.load(Ordering::Relaxed);
            let calls = counters.oracle_calls.load(Ordering::Relaxed);
            let matches = counters.matches.load(Ordering::Relaxed);
            info!(
                "Chunk progress: {}/{} ({:.1}%) | Cache hits: {} | Oracle calls: {} | Matches: {}",
                submitted,
                total,
                submitted as f64 / total.max(1) as f64 * 100.0,
                hits,
                calls,
                matches
            );
        }

        let stats = ScheduleStats {
            windows: total,
            processed: counters.processed.load(Ordering::Relaxed),
            cache_hits: counters.cache_hits.load(Ordering::Relaxed),
            oracle_calls: counters.oracle_calls.load(Ordering::Relaxed),
            matches: counters.matches.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            cancelled,
        };

        if stats.cancelled {
            warn!(
                processed = stats.processed,
                windows = total,
                "Chunk scheduling cancelled"
            );
        }

        Ok(stats)
    }

    async fn process_window(
        &self,
        source: &SourceAudio,
        window: Window,
        counters: &Counters,
        cancel: &CancellationToken,
    ) -> WindowOutcome {
        let key = ChunkKey::derive(&source.content_hash, &window, self.settings.sample_rate);

        if let Some(payload) = self.cache.get(&key).await {
            debug!(chunk_key = %key, "Cache hit");
            counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return WindowOutcome::Done(self.finish(window, payload, counters));
        }

        debug!(chunk_key = %key, "Cache miss");

        let clip = match self.materialize(source.path.clone(), window).await {
            Ok(clip) => clip,
            Err(e) => {
                warn!(
                    start = window.start,
                    length = window.length,
                    error = %e,
                    "Clip extraction failed, skipping window"
                );
                counters.skipped.fetch_add(1, Ordering::Relaxed);
                return WindowOutcome::Skipped;
            }
        };

        let payload: CachedPayload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return WindowOutcome::Cancelled,
            payload = self.recognize_throttled(&clip) => payload,
        };
        counters.oracle_calls.fetch_add(1, Ordering::Relaxed);

        self.cache.put(&key, &payload).await;

        WindowOutcome::Done(self.finish(window, payload, counters))
    }

    /// Run one oracle call while holding a slot
    async fn recognize_throttled(&self, clip: &AudioClip) -> Option<OracleMatch> {
        // The semaphore is never closed, so acquire only fails on a logic error
        let _permit = match self.oracle_slots.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!(error = %e, "Oracle slot unavailable");
                return None;
            }
        };
        self.gateway.recognize(clip).await
    }

    /// Extract the window's clip on the blocking pool
    async fn materialize(&self, path: PathBuf, window: Window) -> Result<AudioClip> {
        let clips = Arc::clone(&self.clips);
        tokio::task::spawn_blocking(move || clips.materialize(&path, &window))
            .await
            .map_err(|e| Error::Internal(format!("Clip extraction task failed: {}", e)))?
            .map_err(|e| Error::Audio(format!("{:#}", e)))
    }

    /// Apply the usable-record policy and count the outcome
    fn finish(&self, window: Window, payload: CachedPayload, counters: &Counters) -> ChunkResult {
        let matched = payload.and_then(OracleMatch::into_record);
        counters.processed.fetch_add(1, Ordering::Relaxed);
        if matched.is_some() {
            counters.matches.fetch_add(1, Ordering::Relaxed);
        }
        ChunkResult { window, matched }
    }
}
