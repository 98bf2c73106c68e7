use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Current time as the RFC 3339 string stored in the `*_at` columns.
///
/// Microsecond precision: a claim's start time doubles as its attempt identity.
pub fn now_rfc3339() -> String {
    format_rfc3339(Utc::now())
}

pub fn format_rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// True when `started_at` lies more than `threshold` before `now`.
///
/// Unparsable or missing timestamps are never stale: there is nothing to
/// measure against, and expiring such rows would race a freshly claimed stage.
pub fn is_older_than(started_at: Option<&str>, threshold: Duration, now: DateTime<Utc>) -> bool {
    let Some(started) = started_at.and_then(parse_rfc3339) else {
        return false;
    };
    let Ok(threshold) = chrono::Duration::from_std(threshold) else {
        return false;
    };
    now.signed_duration_since(started) > threshold
}

/// Date stamp used in remote job names, e.g. `20250114-0930`.
pub fn job_name_stamp() -> String {
    Utc::now().format("%Y%m%d-%H%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_roundtrip() {
        let now = Utc::now();
        let parsed = parse_rfc3339(&format_rfc3339(now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_successive_stamps_are_distinct() {
        let first = now_rfc3339();
        std::thread::sleep(Duration::from_millis(2));
        assert_ne!(first, now_rfc3339());
    }

    #[test]
    fn test_staleness_threshold() {
        let now = Utc::now();
        let two_hours_ago = format_rfc3339(now - chrono::Duration::hours(2));
        assert!(is_older_than(Some(&two_hours_ago), Duration::from_secs(3600), now));
        assert!(!is_older_than(Some(&two_hours_ago), Duration::from_secs(3 * 3600), now));
        assert!(!is_older_than(None, Duration::from_secs(1), now));
        assert!(!is_older_than(Some("yesterday"), Duration::from_secs(1), now));
    }
}
