//! Schedule expression parsing and validation.
//!
//! Expressions use the common five cron fields (minute, hour, day of month,
//! month, day of week) with an optional leading seconds field, plus the
//! named macro schedules `@yearly`/`@annually`, `@monthly`, `@weekly`,
//! `@daily`/`@midnight`, and `@hourly`. Wildcards (`*`), steps (`/`), lists
//! (`,`), ranges (`-`), and the day-blank `?` follow the `cron` crate
//! grammar.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::SchedulerError;

/// A validated schedule expression.
#[derive(Debug, Clone)]
pub struct Schedule {
    inner: cron::Schedule,
}

impl Schedule {
    /// Parse and validate a schedule expression.
    pub fn parse(spec: &str) -> Result<Self, SchedulerError> {
        let normalized = normalize(spec)?;
        let inner = cron::Schedule::from_str(&normalized).map_err(|e| {
            SchedulerError::InvalidSchedule {
                spec: spec.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { inner })
    }

    /// The next fire time strictly after `after`, if the schedule has one.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.after(&after).next()
    }
}

/// Validate a schedule expression without side effects.
///
/// Used before accepting user-supplied expressions; returns a descriptive
/// error for malformed input.
pub fn validate_schedule(spec: &str) -> Result<(), SchedulerError> {
    Schedule::parse(spec).map(|_| ())
}

/// Rewrite an expression into the six-field form the `cron` crate expects:
/// macros expand to their canonical schedules and five-field expressions
/// gain a zeroed seconds field.
fn normalize(spec: &str) -> Result<String, SchedulerError> {
    let trimmed = spec.trim();

    if let Some(name) = trimmed.strip_prefix('@') {
        let expanded = match name.to_ascii_lowercase().as_str() {
            "yearly" | "annually" => "0 0 0 1 1 *",
            "monthly" => "0 0 0 1 * *",
            "weekly" => "0 0 0 * * SUN",
            "daily" | "midnight" => "0 0 0 * * *",
            "hourly" => "0 0 * * * *",
            _ => {
                return Err(SchedulerError::InvalidSchedule {
                    spec: spec.to_string(),
                    reason: format!("unknown descriptor '@{name}'"),
                });
            }
        };
        return Ok(expanded.to_string());
    }

    match trimmed.split_whitespace().count() {
        5 => Ok(format!("0 {trimmed}")),
        6 => Ok(trimmed.to_string()),
        n => Err(SchedulerError::InvalidSchedule {
            spec: spec.to_string(),
            reason: format!("expected 5 or 6 fields, got {n}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test_case("0 0,12 * * *" ; "minute list")]
    #[test_case("0 0/5 * * *" ; "hour step")]
    #[test_case("0 0/5 * * MON,WED,FRI" ; "named weekday list")]
    #[test_case("0 9-17 * * *" ; "hour range")]
    #[test_case("* * * * ?" ; "day blank")]
    #[test_case("* * * JAN-DEC *" ; "named month range")]
    #[test_case("0 * * * * *" ; "explicit seconds")]
    #[test_case("0/5 * * * * *" ; "seconds step")]
    #[test_case("@yearly")]
    #[test_case("@annually")]
    #[test_case("@monthly")]
    #[test_case("@weekly")]
    #[test_case("@daily")]
    #[test_case("@midnight")]
    #[test_case("@hourly")]
    fn accepts_valid_expressions(spec: &str) {
        assert!(validate_schedule(spec).is_ok(), "expected '{spec}' to be valid");
    }

    #[test_case("0 * * *" ; "four fields")]
    #[test_case("0 * *" ; "three fields")]
    #[test_case("0 *" ; "two fields")]
    #[test_case("0" ; "one field")]
    #[test_case("" ; "empty")]
    #[test_case("@fortnightly" ; "unknown descriptor")]
    #[test_case("61 * * * *" ; "minute out of range")]
    #[test_case("* 25 * * *" ; "hour out of range")]
    fn rejects_invalid_expressions(spec: &str) {
        assert!(validate_schedule(spec).is_err(), "expected '{spec}' to be invalid");
    }

    #[test]
    fn hourly_fires_at_top_of_hour() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap();
        let next = Schedule::parse("@hourly").unwrap().next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 11, 0, 0).unwrap());
    }

    #[test]
    fn five_field_expression_fires_on_whole_minutes() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 0, 30).unwrap();
        let next = Schedule::parse("0,30 * * * *")
            .unwrap()
            .next_after(after)
            .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap());
    }

    #[test]
    fn seconds_field_fires_within_the_minute() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 0, 1).unwrap();
        let next = Schedule::parse("0/5 * * * * *")
            .unwrap()
            .next_after(after)
            .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 10, 0, 5).unwrap());
    }

    #[test]
    fn weekly_fires_on_sunday_midnight() {
        // 2026-02-22 is a Sunday
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 1, 0, 0).unwrap();
        let next = Schedule::parse("@weekly").unwrap().next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn parse_error_names_the_expression() {
        let err = validate_schedule("0 * * *").unwrap_err();
        assert!(err.to_string().contains("0 * * *"));
        assert!(!err.is_fatal());
    }
}
