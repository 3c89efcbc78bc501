//! Recognition oracle transport
//!
//! The oracle is a black box: it receives a short mono WAV clip and answers with
//! either nothing or a JSON document whose `track` object describes the match.
//! [`HttpOracle`] talks to such a service over HTTP.

use crate::audio::AudioClip;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const USER_AGENT: &str = concat!("setscan/", env!("CARGO_PKG_VERSION"));

/// External audio-recognition capability
///
/// `Ok(None)` means the oracle ran and found nothing. Errors cover transport,
/// status and parse failures; callers decide how to treat them.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Wait until the next request may be sent
    ///
    /// Time spent here is not charged against the gateway's call timeout.
    async fn ready(&self) {}

    async fn identify(&self, clip: &AudioClip) -> Result<Option<Value>>;
}

/// Minimum spacing between consecutive requests
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Oracle rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// HTTP recognition service client
///
/// POSTs the clip as `audio/wav` and expects a JSON body. A body without a
/// `track` object is a "no match".
pub struct HttpOracle {
    http_client: reqwest::Client,
    endpoint: String,
    rate_limiter: RateLimiter,
}

impl HttpOracle {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, min_interval_ms: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            rate_limiter: RateLimiter::new(min_interval_ms),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn ready(&self) {
        self.rate_limiter.wait().await;
    }

    async fn identify(&self, clip: &AudioClip) -> Result<Option<Value>> {
        let wav = clip.to_wav_bytes()?;

        tracing::debug!(
            bytes = wav.len(),
            seconds = clip.duration_seconds(),
            "Querying recognition oracle"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(wav)
            .send()
            .await
            .context("Oracle request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Oracle returned {}: {}", status.as_u16(), error_text);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse oracle response")?;

        Ok(has_track(&body).then_some(body))
    }
}

/// True when the response carries a `track` object
pub fn has_track(response: &Value) -> bool {
    response.get("track").map(Value::is_object).unwrap_or(false)
}
