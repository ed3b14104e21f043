//! Timestamp ingestion.
//!
//! Every collaborator reports time as a string. Values are parsed exactly once,
//! at ingestion, into `DateTime<Utc>`; anything that fails to parse becomes
//! `None` and is kept out of every recency comparison downstream.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a collaborator timestamp. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Calendar date at the head of a `YYYY-MM-DD ...` string.
///
/// Used for bucketing when only the date part matters, so a record with a
/// damaged time-of-day still lands in the right day.
pub fn parse_date_prefix(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// `YYYY-MM` key for a date.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Parse a `YYYY-MM` month key back to the first day of that month.
pub fn parse_month_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", key.trim()), "%Y-%m-%d").ok()
}

/// Keep the later of two optional instants. `None` never wins against a value.
pub fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use test_case::test_case;

    #[test_case("2024-03-01 10:00:00" ; "space separated")]
    #[test_case("2024-03-01T10:00:00" ; "iso naive")]
    #[test_case("2024-03-01T10:00:00.123456" ; "fractional seconds")]
    #[test_case("2024-03-01T10:00:00Z" ; "rfc3339 utc")]
    #[test_case("2024-03-01T15:30:00+05:30" ; "rfc3339 offset")]
    fn parses_supported_shapes(raw: &str) {
        let ts = parse_timestamp(raw);
        assert!(ts.is_some(), "failed to parse {raw}");
        let ts = ts.unwrap();
        assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(ts.hour(), 10);
    }

    #[test_case("" ; "empty")]
    #[test_case("yesterday" ; "prose")]
    #[test_case("2024-13-01 10:00:00" ; "bad month")]
    #[test_case("2024-03-01 25:00:00" ; "bad hour")]
    fn rejects_malformed(raw: &str) {
        assert_eq!(parse_timestamp(raw), None);
    }

    #[test]
    fn date_prefix_survives_damaged_time() {
        let d = parse_date_prefix("2024-03-02 xx:yy").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 3, 2));
        assert_eq!(parse_date_prefix("03/02/2024"), None);
        assert_eq!(parse_date_prefix("2024"), None);
    }

    #[test]
    fn month_keys_round_trip() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        assert_eq!(month_key(d), "2024-03");
        assert_eq!(
            parse_month_key("2024-03"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_month_key("March"), None);
    }

    #[test]
    fn latest_ignores_missing_values() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single();
        let b = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).single();
        assert_eq!(latest(a, b), b);
        assert_eq!(latest(b, None), b);
        assert_eq!(latest(None, a), a);
        assert_eq!(latest(None, None), None);
    }
}
