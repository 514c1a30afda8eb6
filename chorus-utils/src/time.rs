//! Time formatting and parsing helpers.

use std::time::Duration;
use thiserror::Error;

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Errors raised while parsing a human-readable period string (§4.3).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("empty period string")]
    Empty,
    #[error("invalid period string: {0:?}")]
    Invalid(String),
    #[error("unknown period unit {0:?} (expected s, m, or h)")]
    UnknownUnit(char),
}

/// Parse a rate-limiter period string such as `"10s"`, `"1m"`, or `"2h"` into
/// a [`Duration`]. Accepts a bare integer number of seconds too (no suffix).
///
/// The inverse of [`format_duration`], for the one place that needs to go
/// from human text back to a machine duration: the token-bucket rate
/// limiter's `period_seconds` configuration (§4.3).
pub fn parse_period(input: &str) -> Result<Duration, PeriodError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PeriodError::Empty);
    }

    let (digits, unit) = match input.chars().last() {
        Some(c) if c.is_ascii_digit() => (input, 's'),
        Some(c) => (&input[..input.len() - c.len_utf8()], c),
        None => return Err(PeriodError::Empty),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| PeriodError::Invalid(input.to_string()))?;

    let secs = match unit {
        's' => value,
        'm' => value * 60,
        'h' => value * 3600,
        other => return Err(PeriodError::UnknownUnit(other)),
    };

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_seconds() {
        assert_eq!(format_duration(45), "45s");
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_duration(125), "2m 5s");
    }

    #[test]
    fn formats_hours_and_minutes() {
        assert_eq!(format_duration(3725), "1h 2m");
    }

    #[test]
    fn parses_seconds() {
        assert_eq!(parse_period("10s").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn parses_minutes() {
        assert_eq!(parse_period("1m").unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn parses_hours() {
        assert_eq!(parse_period("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn parses_bare_number_as_seconds() {
        assert_eq!(parse_period("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_empty_string() {
        assert_eq!(parse_period(""), Err(PeriodError::Empty));
        assert_eq!(parse_period("   "), Err(PeriodError::Empty));
    }

    #[test]
    fn rejects_unknown_unit() {
        assert_eq!(parse_period("10d"), Err(PeriodError::UnknownUnit('d')));
    }

    #[test]
    fn rejects_non_numeric_value() {
        assert!(matches!(parse_period("abcs"), Err(PeriodError::Invalid(_))));
    }
}
