//! Schedule parsing and next-run computation
//!
//! Jobs are scheduled either with a standard 5-field cron expression
//! (minute, hour, day, month, weekday), one of the `@hourly`/`@daily`/...
//! aliases, or a fixed interval written as `@every <duration>` (for example
//! `@every 1m30s`). `next_after` returns the first instant strictly after
//! the given one.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::ValidationError;

/// A parsed job schedule.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Cron expression, including the `@daily`-style aliases.
    Cron(cron::Schedule),
    /// Fixed interval (`@every <duration>`).
    Every(Duration),
}

impl Schedule {
    /// Parses a schedule expression.
    ///
    /// 5-field expressions are accepted by normalizing them to the 6-field
    /// form the cron library expects (a zeroed seconds field is prepended).
    pub fn parse(expr: &str) -> Result<Self, ValidationError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ValidationError::InvalidCronSchedule);
        }

        if let Some(interval) = expr.strip_prefix("@every ") {
            let interval = parse_interval(interval)?;
            return Ok(Self::Every(interval));
        }

        let normalized = if !expr.starts_with('@') && expr.split_whitespace().count() == 5 {
            format!("0 {expr}")
        } else {
            expr.to_string()
        };

        cron::Schedule::from_str(&normalized)
            .map(Self::Cron)
            .map_err(|_| ValidationError::InvalidCronSchedule)
    }

    /// Returns the first instant strictly after `from` satisfying the
    /// schedule, or `None` when no such instant exists.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(schedule) => schedule.after(&from).next(),
            Self::Every(interval) => {
                let interval = chrono::Duration::from_std(*interval).ok()?;
                from.checked_add_signed(interval)
            }
        }
    }
}

/// Parses an `@every` interval such as `30s`, `5m`, `1h`, `1m30s` or `500ms`.
fn parse_interval(input: &str) -> Result<Duration, ValidationError> {
    let input = input.trim();
    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let value: u64 = digits
            .parse()
            .map_err(|_| ValidationError::InvalidCronSchedule)?;
        digits.clear();

        let millis = match c {
            'h' => value.checked_mul(3_600_000),
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                Some(value)
            }
            'm' => value.checked_mul(60_000),
            's' => value.checked_mul(1_000),
            _ => return Err(ValidationError::InvalidCronSchedule),
        }
        .ok_or(ValidationError::InvalidCronSchedule)?;

        total += Duration::from_millis(millis);
    }

    // A trailing number without a unit is malformed, as is an empty input.
    if !digits.is_empty() || total.is_zero() {
        return Err(ValidationError::InvalidCronSchedule);
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_five_field_expressions() {
        let schedule = Schedule::parse("*/5 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap();
        let next = schedule.next_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2023, 4, 1, 12, 5, 0).unwrap());
    }

    #[test]
    fn parses_aliases() {
        let schedule = Schedule::parse("@daily").unwrap();
        let from = Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap();
        let next = schedule.next_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2023, 4, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn parses_every_intervals() {
        let schedule = Schedule::parse("@every 1m").unwrap();
        let from = Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 30).unwrap();
        let next = schedule.next_after(from).unwrap();
        assert_eq!(next, from + chrono::Duration::minutes(1));

        let schedule = Schedule::parse("@every 1m30s").unwrap();
        let next = schedule.next_after(from).unwrap();
        assert_eq!(next, from + chrono::Duration::seconds(90));

        let schedule = Schedule::parse("@every 500ms").unwrap();
        let next = schedule.next_after(from).unwrap();
        assert_eq!(next, from + chrono::Duration::milliseconds(500));
    }

    #[test]
    fn next_is_strictly_after() {
        // An instant exactly on the schedule must advance to the following one.
        let schedule = Schedule::parse("0 * * * *").unwrap();
        let on_schedule = Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap();
        let next = schedule.next_after(on_schedule).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2023, 4, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn next_of_next_is_monotonic() {
        let schedule = Schedule::parse("*/10 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2023, 4, 1, 12, 3, 0).unwrap();
        let first = schedule.next_after(from).unwrap();
        let second = schedule.next_after(first).unwrap();
        assert!(second > first);
        assert!(first > from);
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(Schedule::parse("").is_err());
        assert!(Schedule::parse("not a cron").is_err());
        assert!(Schedule::parse("* * * *").is_err());
        assert!(Schedule::parse("@every").is_err());
        assert!(Schedule::parse("@every 0s").is_err());
        assert!(Schedule::parse("@every 10").is_err());
        assert!(Schedule::parse("@every 10x").is_err());
    }
}
