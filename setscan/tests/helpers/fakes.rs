//! Fake collaborators
//!
//! [`WindowClips`] encodes each window's start offset into the clip samples so
//! [`ScriptedOracle`] can answer per window without decoding anything.

use async_trait::async_trait;
use serde_json::{json, Value};
use setscan::audio::{AudioClip, ClipSource};
use setscan::oracle::Oracle;
use setscan::Window;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(f64) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// Oracle answering from a closure of the window start, with call accounting
pub struct ScriptedOracle {
    respond: Responder,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    seen_starts: Mutex<Vec<f64>>,
}

impl ScriptedOracle {
    pub fn new(respond: impl Fn(f64) -> anyhow::Result<Option<Value>> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            delay: Duration::from_millis(10),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            seen_starts: Mutex::new(Vec::new()),
        }
    }

    /// Same track for every window
    pub fn always(track_id: &str, confidence: Option<f64>) -> Self {
        let response = track_response(track_id, "Artist", "Title", confidence);
        Self::new(move |_| Ok(Some(response.clone())))
    }

    pub fn never_matches() -> Self {
        Self::new(|_| Ok(None))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn seen_starts(&self) -> Vec<f64> {
        let mut starts = self.seen_starts.lock().unwrap().clone();
        starts.sort_by(f64::total_cmp);
        starts
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn identify(&self, clip: &AudioClip) -> anyhow::Result<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let start = clip.samples.first().copied().unwrap_or(0.0) as f64;
        self.seen_starts.lock().unwrap().push(start);
        (self.respond)(start)
    }
}

/// Clip source with a fixed duration; clip samples carry the window start
pub struct WindowClips {
    duration: f64,
    fail_starts: Vec<f64>,
    delay: Duration,
    materialized: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl WindowClips {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            fail_starts: Vec::new(),
            delay: Duration::ZERO,
            materialized: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Block each extraction for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most extractions observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Fail extraction for windows starting at these offsets
    pub fn failing_at(mut self, starts: &[f64]) -> Self {
        self.fail_starts = starts.to_vec();
        self
    }

    pub fn materialized(&self) -> usize {
        self.materialized.load(Ordering::SeqCst)
    }
}

impl ClipSource for WindowClips {
    fn duration(&self, _path: &Path) -> anyhow::Result<f64> {
        Ok(self.duration)
    }

    fn materialize(&self, _path: &Path, window: &Window) -> anyhow::Result<AudioClip> {
        self.materialized.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_starts.contains(&window.start) {
            anyhow::bail!("corrupt frame at {:.2}s", window.start);
        }
        Ok(AudioClip {
            samples: vec![window.start as f32; 8],
            sample_rate: 16_000,
        })
    }
}

/// Oracle response in the common `{"track": {...}}` shape
pub fn track_response(track_id: &str, artist: &str, title: &str, confidence: Option<f64>) -> Value {
    let mut track = json!({
        "key": track_id,
        "subtitle": artist,
        "title": title,
    });
    if let Some(c) = confidence {
        track["score"] = json!(c);
    }
    json!({ "track": track })
}

/// Write arbitrary bytes standing in for a source recording
pub fn write_source_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
