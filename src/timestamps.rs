//! ISO-8601 helpers shared by the aggregation and ingestion sides

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Parse an RFC 3339 timestamp (`Z` or offset). Naive timestamps without an
/// offset are read as UTC.
pub fn parse_iso8601(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Millisecond precision, used in query filters
pub fn iso_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Seconds between two timestamps; 0.0 when either side is absent or unparsable
pub fn duration_secs(start: Option<&str>, end: Option<&str>) -> f64 {
    match (start.and_then(parse_iso8601), end.and_then(parse_iso8601)) {
        (Some(start), Some(end)) => {
            let elapsed = end - start;
            match elapsed.num_microseconds() {
                Some(micros) => micros as f64 / 1_000_000.0,
                None => elapsed.num_milliseconds() as f64 / 1000.0,
            }
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        let z = parse_iso8601("2025-03-01T10:00:00Z").unwrap();
        let offset = parse_iso8601("2025-03-01T12:00:00+02:00").unwrap();
        let naive = parse_iso8601("2025-03-01T10:00:00.000").unwrap();
        assert_eq!(z, offset);
        assert_eq!(z, naive);
        assert!(parse_iso8601("yesterday").is_none());
    }

    #[test]
    fn test_duration() {
        assert_eq!(
            duration_secs(Some("2025-03-01T10:00:00Z"), Some("2025-03-01T10:00:12.500Z")),
            12.5
        );
        assert_eq!(duration_secs(Some("garbage"), Some("2025-03-01T10:00:00Z")), 0.0);
        assert_eq!(duration_secs(None, Some("2025-03-01T10:00:00Z")), 0.0);
    }

    #[test]
    fn test_duration_keeps_microseconds() {
        assert_eq!(
            duration_secs(Some("2025-03-01T10:00:00Z"), Some("2025-03-01T10:00:01.250125Z")),
            1.250125
        );
    }

    #[test]
    fn test_iso_millis() {
        let ts = parse_iso8601("2025-03-01T10:00:00Z").unwrap();
        assert_eq!(iso_millis(ts), "2025-03-01T10:00:00.000Z");
    }
}
