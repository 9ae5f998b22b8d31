// Start of file: src/utils/time.rs

// * Date-time helpers shared by responses, logs and the scheduler.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Layout used when no explicit format is given.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn format_datetime<Tz: TimeZone>(value: &DateTime<Tz>, format: Option<&str>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    value.format(format.unwrap_or(DEFAULT_DATETIME_FORMAT)).to_string()
}

/// Accepts RFC 3339, or `format` (default `%Y-%m-%d %H:%M:%S`) read as UTC.
pub fn parse_datetime(value: &str, format: Option<&str>) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let layout: &str = format.unwrap_or(DEFAULT_DATETIME_FORMAT);
    NaiveDateTime::parse_from_str(value, layout)
        .map(|naive| naive.and_utc())
        .map_err(|err| anyhow!("invalid datetime '{value}' for format '{layout}': {err}"))
}

pub fn from_timestamp_ms(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn parses_both_layouts() {
        let a: DateTime<Utc> = parse_datetime("2024-03-01T12:30:00+02:00", None).unwrap();
        let b: DateTime<Utc> = parse_datetime("2024-03-01 10:30:00", None).unwrap();
        assert_eq!(a, b);
        assert!(parse_datetime("yesterday", None).is_err());
    }

    #[test]
    fn formats_with_default_layout() {
        let value: DateTime<Utc> = parse_datetime("2024-01-02 03:04:05", None).unwrap();
        assert_eq!(format_datetime(&value, None), "2024-01-02 03:04:05");
        assert_eq!(format_datetime(&value, Some("%d/%m/%Y")), "02/01/2024");
    }

    #[test]
    fn converts_millis() {
        let value: DateTime<Utc> = from_timestamp_ms(0).unwrap();
        assert_eq!(value.year(), 1970);
        assert!(timestamp_ms() > 0);
        assert!(now_utc().year() >= 2024);
    }
}

// End of file: src/utils/time.rs
