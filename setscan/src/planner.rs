//! Window planning
//!
//! Splits a recording of known duration into fixed-length, overlapping windows.
//! Planning is pure: identical inputs always yield identical windows, which keeps
//! chunk keys stable across runs.

use crate::types::Window;

/// Windows shorter than this are discarded
pub const MIN_WINDOW_SECONDS: f64 = 1.0;

/// Plan overlapping windows over `duration` seconds
///
/// **Algorithm:**
/// 1. `step = max(1, chunk_length - overlap)`
/// 2. From `t = 0`, emit `(t, min(chunk_length, duration - t))` and advance by `step`
/// 3. Stop at the first window that would be `<= 1` second (trailing sliver dropped)
///
/// `duration <= 1` yields no windows. `overlap >= chunk_length` is not an error;
/// the step is clamped to one second.
pub fn plan(duration: f64, chunk_length: f64, overlap: f64) -> Vec<Window> {
    let step = (chunk_length - overlap).max(1.0);
    let mut windows = Vec::new();

    if !duration.is_finite() || !step.is_finite() {
        return windows;
    }

    let mut t = 0.0;
    while t < duration {
        let length = chunk_length.min((duration - t).max(0.0));
        if length <= MIN_WINDOW_SECONDS {
            break;
        }
        windows.push(Window::new(t, length));
        t += step;
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_durations_yield_nothing() {
        for duration in [-5.0, 0.0, 0.5, 1.0] {
            assert!(plan(duration, 30.0, 10.0).is_empty(), "duration {}", duration);
        }
    }

    #[test]
    fn test_standard_overlap() {
        let windows = plan(70.0, 30.0, 10.0);
        let starts: Vec<f64> = windows.iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![0.0, 20.0, 40.0, 60.0]);
        assert_eq!(windows[0].length, 30.0);
        assert_eq!(windows[2].length, 30.0);
        assert_eq!(windows[3].length, 10.0);
    }

    #[test]
    fn test_trailing_sliver_dropped() {
        // 61s: window at 60 would be exactly 1s long
        let windows = plan(61.0, 30.0, 10.0);
        assert_eq!(windows.last().unwrap().start, 40.0);
    }

    #[test]
    fn test_overlap_exceeding_chunk_clamps_step() {
        let windows = plan(5.0, 3.0, 10.0);
        let starts: Vec<f64> = windows.iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(windows[3].length, 2.0);
    }

    #[test]
    fn test_window_invariants() {
        for &(duration, chunk, overlap) in &[
            (3600.0, 30.0, 10.0),
            (125.7, 12.0, 0.0),
            (17.3, 5.0, 4.5),
            (9.9, 20.0, 5.0),
        ] {
            let windows = plan(duration, chunk, overlap);
            for pair in windows.windows(2) {
                assert!(pair[1].start > pair[0].start);
                // No audio skipped by more than a chunk
                assert!(pair[1].start - pair[0].start <= chunk.max(1.0));
            }
            for w in &windows {
                assert!(w.length <= chunk);
                assert!(w.length > MIN_WINDOW_SECONDS);
                assert!(w.end() <= duration + 1e-9);
            }
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        assert_eq!(plan(5400.0, 30.0, 10.0), plan(5400.0, 30.0, 10.0));
    }

    #[test]
    fn test_non_positive_chunk_length_yields_nothing() {
        assert!(plan(100.0, 0.0, 0.0).is_empty());
        assert!(plan(100.0, -3.0, 0.0).is_empty());
    }
}
