use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};

pub fn parse_utc(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| AppError::InvalidInput(format!("invalid datetime: {}", err)))
}

/// Minutes from `now` until `later`, clamped at zero.
pub fn minutes_until(now: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    ((later - now).num_milliseconds() as f64 / 60_000.0).max(0.0)
}
