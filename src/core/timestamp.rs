use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, NaiveDateTime};

/// File name timestamp, sortable lexicographically and chronologically.
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const OVERLAY_STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

pub fn utc_ns_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub fn file_stamp(at: &DateTime<Local>) -> String {
    at.format(FILE_STAMP_FORMAT).to_string()
}

pub fn parse_file_stamp(stamp: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(stamp, FILE_STAMP_FORMAT).ok()
}

pub fn overlay_stamp(at: &DateTime<Local>) -> String {
    at.format(OVERLAY_STAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_stamp_round_trips() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let stamp = file_stamp(&at);
        assert_eq!(stamp, "20240309_070501");
        assert_eq!(parse_file_stamp(&stamp), Some(at.naive_local()));
    }

    #[test]
    fn file_stamps_sort_chronologically() {
        let a = Local.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let b = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(file_stamp(&a) < file_stamp(&b));
    }

    #[test]
    fn overlay_stamp_has_millis() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(overlay_stamp(&at), "2024-03-09 07:05:01.000");
    }

    #[test]
    fn rejects_malformed_stamp() {
        assert!(parse_file_stamp("2024-03-09").is_none());
        assert!(parse_file_stamp("20241309_070501").is_none());
    }
}
