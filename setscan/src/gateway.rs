//! Recognition gateway
//!
//! Wraps an [`Oracle`] into a call that always resolves to a definite answer:
//! `Some(OracleMatch)` or `None`. Timeouts, transport errors and malformed
//! responses are logged and become `None`; nothing propagates to the scheduler.
//!
//! The oracle's wire shape is not fixed, so field extraction tries several
//! candidate names:
//! - track id: `key`, `id`, `shazam_id`, `shazamID`
//! - title: `title`
//! - artist: `subtitle`, then `artist`
//! - confidence: `confidence`, `score`, `probability` (first numeric)

use crate::audio::AudioClip;
use crate::oracle::Oracle;
use crate::types::OracleMatch;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

const TRACK_ID_FIELDS: [&str; 4] = ["key", "id", "shazam_id", "shazamID"];
const ARTIST_FIELDS: [&str; 2] = ["subtitle", "artist"];
const CONFIDENCE_FIELDS: [&str; 3] = ["confidence", "score", "probability"];

/// Uniform, failure-free front for the recognition oracle
pub struct RecognitionGateway {
    oracle: Arc<dyn Oracle>,
    /// Upper bound on one oracle call, on top of the oracle's own timeouts.
    /// Rate-limit queueing before the call is not counted.
    call_timeout: Duration,
}

impl RecognitionGateway {
    pub fn new(oracle: Arc<dyn Oracle>, call_timeout: Duration) -> Self {
        Self {
            oracle,
            call_timeout,
        }
    }

    /// Recognize one clip
    ///
    /// Returns `None` for "no match" and for any failure.
    pub async fn recognize(&self, clip: &AudioClip) -> Option<OracleMatch> {
        self.oracle.ready().await;

        let response = match tokio::time::timeout(self.call_timeout, self.oracle.identify(clip)).await
        {
            Ok(Ok(response)) => response?,
            Ok(Err(e)) => {
                tracing::warn!(error = %format!("{:#}", e), "Oracle call failed, treating as no match");
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.call_timeout.as_secs_f64(),
                    "Oracle call timed out, treating as no match"
                );
                return None;
            }
        };

        extract_match(&response)
    }
}

/// Extract match fields from a raw oracle response
///
/// Returns `None` when the response has no `track` object.
pub fn extract_match(response: &Value) -> Option<OracleMatch> {
    let track = response.get("track")?.as_object()?;

    Some(OracleMatch {
        track_id: extract_track_id(track),
        artist: first_string(track, &ARTIST_FIELDS),
        title: first_string(track, &["title"]),
        confidence: extract_confidence(track),
    })
}

fn extract_track_id(track: &Map<String, Value>) -> Option<String> {
    TRACK_ID_FIELDS.iter().find_map(|&name| match track.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_string(track: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|&name| match track.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

fn extract_confidence(track: &Map<String, Value>) -> Option<f64> {
    CONFIDENCE_FIELDS
        .iter()
        .find_map(|&name| track.get(name)?.as_f64())
        .map(normalize_confidence)
}

/// Scale percentages into [0, 1]
///
/// Values in `(1, 100]` are treated as percentages; anything else is taken as-is.
pub fn normalize_confidence(value: f64) -> f64 {
    if value > 1.0 && value <= 100.0 {
        value / 100.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedOracle(anyhow::Result<Option<Value>>);

    #[async_trait]
    impl Oracle for FixedOracle {
        async fn identify(&self, _clip: &AudioClip) -> anyhow::Result<Option<Value>> {
            match &self.0 {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    struct HangingOracle;

    #[async_trait]
    impl Oracle for HangingOracle {
        async fn identify(&self, _clip: &AudioClip) -> anyhow::Result<Option<Value>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    /// Queues longer than the call timeout, then answers at once
    struct PacedOracle;

    #[async_trait]
    impl Oracle for PacedOracle {
        async fn ready(&self) {
            tokio::time::sleep(Duration::from_millis(400)).await;
        }

        async fn identify(&self, _clip: &AudioClip) -> anyhow::Result<Option<Value>> {
            Ok(Some(json!({"track": {"key": "7", "title": "T", "subtitle": "A"}})))
        }
    }

    fn clip() -> AudioClip {
        AudioClip {
            samples: vec![0.0; 16],
            sample_rate: 16_000,
        }
    }

    fn gateway(oracle: impl Oracle + 'static) -> RecognitionGateway {
        RecognitionGateway::new(Arc::new(oracle), Duration::from_millis(200))
    }

    #[test]
    fn test_extract_typical_response() {
        let response = json!({
            "matches": [{"id": "123"}],
            "track": {"key": "40333609", "title": "Strobe", "subtitle": "deadmau5"}
        });
        let m = extract_match(&response).unwrap();
        assert_eq!(m.track_id.as_deref(), Some("40333609"));
        assert_eq!(m.title.as_deref(), Some("Strobe"));
        assert_eq!(m.artist.as_deref(), Some("deadmau5"));
        assert_eq!(m.confidence, None);
    }

    #[test]
    fn test_track_id_fallback_order_and_numbers() {
        let m = extract_match(&json!({"track": {"shazam_id": 77, "title": "X", "artist": "Y"}})).unwrap();
        assert_eq!(m.track_id.as_deref(), Some("77"));
        assert_eq!(m.artist.as_deref(), Some("Y"));

        let m = extract_match(&json!({"track": {"id": "b", "key": "a"}})).unwrap();
        assert_eq!(m.track_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_subtitle_preferred_over_artist() {
        let m = extract_match(&json!({"track": {"subtitle": "S", "artist": "A"}})).unwrap();
        assert_eq!(m.artist.as_deref(), Some("S"));
    }

    #[test]
    fn test_confidence_normalization() {
        assert_eq!(normalize_confidence(87.0), 0.87);
        assert_eq!(normalize_confidence(100.0), 1.0);
        assert_eq!(normalize_confidence(1.0), 1.0);
        assert_eq!(normalize_confidence(0.4), 0.4);
        assert_eq!(normalize_confidence(250.0), 250.0);

        let m = extract_match(&json!({"track": {"score": 90}})).unwrap();
        assert_eq!(m.confidence, Some(0.9));

        let m = extract_match(&json!({"track": {"confidence": "high", "probability": 0.3}})).unwrap();
        assert_eq!(m.confidence, Some(0.3));
    }

    #[test]
    fn test_missing_track_is_no_match() {
        assert!(extract_match(&json!({"matches": []})).is_none());
        assert!(extract_match(&json!({"track": "nope"})).is_none());
    }

    #[tokio::test]
    async fn test_recognize_success() {
        let gw = gateway(FixedOracle(Ok(Some(
            json!({"track": {"key": "1", "title": "T", "subtitle": "A", "confidence": 0.8}}),
        ))));
        let m = gw.recognize(&clip()).await.unwrap();
        assert_eq!(m.confidence, Some(0.8));
    }

    #[tokio::test]
    async fn test_recognize_no_match() {
        let gw = gateway(FixedOracle(Ok(None)));
        assert!(gw.recognize(&clip()).await.is_none());
    }

    #[tokio::test]
    async fn test_recognize_error_normalized() {
        let gw = gateway(FixedOracle(Err(anyhow::anyhow!("connection reset"))));
        assert!(gw.recognize(&clip()).await.is_none());
    }

    #[tokio::test]
    async fn test_recognize_timeout_normalized() {
        let gw = gateway(HangingOracle);
        assert!(gw.recognize(&clip()).await.is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_queueing_not_timed() {
        let gw = gateway(PacedOracle);
        let m = gw.recognize(&clip()).await.unwrap();
        assert_eq!(m.track_id.as_deref(), Some("7"));
    }
}
