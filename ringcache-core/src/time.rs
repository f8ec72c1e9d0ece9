//! Wire-format timestamps: `Y:M:D:H:M:S`, seconds precision, UTC, per spec.md §4.4.

use crate::error::ProtocolError;
use chrono::{DateTime, TimeZone, Utc};

/// Format a timestamp as `Y:M:D:H:M:S` (no zero-padding, no sub-second part).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}",
        ts.format("%Y"),
        ts.format("%-m"),
        ts.format("%-d"),
        ts.format("%-H"),
        ts.format("%-M"),
        ts.format("%-S"),
    )
}

/// Parse a `Y:M:D:H:M:S` timestamp frame.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ProtocolError> {
    let mut fields = s.splitn(6, ':');
    let mut next = |name: &str| -> Result<i64, ProtocolError> {
        fields
            .next()
            .ok_or_else(|| ProtocolError::InvalidTimestamp(s.to_string()))?
            .parse::<i64>()
            .map_err(|_| ProtocolError::InvalidTimestamp(s.to_string()))
    };
    let year = next("year")?;
    let month = next("month")?;
    let day = next("day")?;
    let hour = next("hour")?;
    let minute = next("minute")?;
    let second = next("second")?;

    Utc.with_ymd_and_hms(
        year as i32,
        month as u32,
        day as u32,
        hour as u32,
        minute as u32,
        second as u32,
    )
    .single()
    .ok_or_else(|| ProtocolError::InvalidTimestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 9, 1, 2).unwrap();
        let s = format_timestamp(ts);
        assert_eq!(s, "2026:3:5:9:1:2");
        assert_eq!(parse_timestamp(&s).unwrap(), ts);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("not-a-timestamp").is_err());
        assert!(parse_timestamp("2026:13:40:99:99:99").is_err());
    }
}
