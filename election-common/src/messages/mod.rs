pub mod candidate;
pub mod vote;
pub mod voter;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn serialize_datetime<S>(datetime: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&datetime.format(DATETIME_FORMAT).to_string())
}

pub fn deserialize_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let formatted: String = Deserialize::deserialize(deserializer)?;
    parse_datetime(&formatted)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid datetime: {formatted}")))
}

/// Accepts both the wire format written by the voting worker and RFC 3339.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_both_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 5).unwrap();

        assert_eq!(parse_datetime("2024-06-01 12:30:05"), Some(expected));
        assert_eq!(parse_datetime("2024-06-01T12:30:05Z"), Some(expected));
        assert_eq!(parse_datetime("2024-06-01T14:30:05+02:00"), Some(expected));
        assert_eq!(parse_datetime("yesterday"), None);
    }
}
