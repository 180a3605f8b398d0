//! Shared row-decoding helpers.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::domain::errors::DomainError;

/// Parse a timestamp column stored as RFC 3339 or SQLite datetime text.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DomainError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // SQLite's datetime('now') emits "YYYY-MM-DD HH:MM:SS" in UTC.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DomainError::Serialization(format!("invalid timestamp '{s}': {e}")))
}

/// Parse an optional timestamp column.
pub fn parse_datetime_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>, DomainError> {
    s.map(parse_datetime).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339() {
        let dt = parse_datetime("2026-08-01T12:00:00Z").unwrap();
        assert_eq!(dt.timestamp(), 1_785_585_600);
    }

    #[test]
    fn parses_sqlite_datetime() {
        assert!(parse_datetime("2026-08-01 12:00:00").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datetime("not-a-date").is_err());
    }
}
