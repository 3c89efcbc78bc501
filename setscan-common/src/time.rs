//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC time as whole seconds since the Unix epoch
pub fn unix_seconds() -> i64 {
    now().timestamp()
}

/// Folder-safe run stamp, e.g. `2025-03-14_09-26-53`
pub fn run_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d_%H-%M-%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_unix_seconds_matches_now() {
        let a = unix_seconds();
        let b = now().timestamp();
        assert!(b - a <= 1);
    }

    #[test]
    fn test_run_stamp_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(run_stamp(at), "2025-03-14_09-26-53");
    }
}
