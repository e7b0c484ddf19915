//! Storage key generation.
//!
//! Keys are `image_<YYYYMMDD_HHMMSS>.jpg` on the local clock at second
//! resolution. Two uploads in the same second share a key and the later
//! write replaces the earlier one.

use chrono::{Local, NaiveDateTime};

/// Format of the timestamp embedded in keys and returned to clients
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Source of "now" for key generation
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A generated storage key and the timestamp string it was derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKey {
    pub filename: String,
    pub timestamp: String,
}

/// Derive the storage key for a frame received at `now`.
pub fn generate(now: NaiveDateTime) -> StorageKey {
    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();

    StorageKey {
        filename: format!("image_{timestamp}.jpg"),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    #[test]
    fn test_key_format() {
        let key = generate(at(12, 0, 0, 0));
        assert_eq!(key.filename, "image_20240101_120000.jpg");
        assert_eq!(key.timestamp, "20240101_120000");
    }

    #[test]
    fn test_sub_second_precision_is_dropped() {
        assert_eq!(generate(at(9, 5, 7, 10)), generate(at(9, 5, 7, 990)));
    }

    #[test]
    fn test_distinct_seconds_give_distinct_keys() {
        assert_ne!(generate(at(9, 5, 7, 0)), generate(at(9, 5, 8, 0)));
    }

    #[test]
    fn test_system_clock_produces_well_formed_key() {
        let key = generate(SystemClock.now());
        assert!(key.filename.starts_with("image_"));
        assert!(key.filename.ends_with(".jpg"));
        assert_eq!(key.timestamp.len(), "YYYYMMDD_HHMMSS".len());
    }
}
