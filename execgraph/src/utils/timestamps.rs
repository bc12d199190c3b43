//! Timestamp helpers.
//!
//! Execution stores commonly persist epoch milliseconds; records carry
//! `chrono` timestamps.

use chrono::{DateTime, TimeZone, Utc};

/// Timestamp type used on records and vertices.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Converts epoch milliseconds to a timestamp.
///
/// Returns `None` if the value is out of range.
#[must_use]
pub fn from_epoch_millis(millis: i64) -> Option<Timestamp> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Converts a timestamp to epoch milliseconds.
#[must_use]
pub fn to_epoch_millis(ts: &Timestamp) -> i64 {
    ts.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_millis_round_trip() {
        let ts = from_epoch_millis(1_700_000_000_123).unwrap();
        assert_eq!(to_epoch_millis(&ts), 1_700_000_000_123);
    }

    #[test]
    fn test_ordering_follows_millis() {
        let early = from_epoch_millis(100).unwrap();
        let late = from_epoch_millis(200).unwrap();
        assert!(early < late);
    }
}
