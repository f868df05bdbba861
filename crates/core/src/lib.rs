use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

mod forecast;
mod window;

pub use forecast::{ForecastStatus, Projection, format_minutes, least_squares_slope, project};
pub use window::{next_weekly_boundary, roll_forward};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
}

impl UsageTotals {
    pub fn from_parts(
        input_tokens: u64,
        output_tokens: u64,
        cache_creation_tokens: u64,
        cache_read_tokens: u64,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cache_creation_tokens,
            cache_read_tokens,
            total_tokens: input_tokens
                .saturating_add(output_tokens)
                .saturating_add(cache_creation_tokens)
                .saturating_add(cache_read_tokens),
        }
    }

    pub fn add(self, other: UsageTotals) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
            cache_creation_tokens: self
                .cache_creation_tokens
                .saturating_add(other.cache_creation_tokens),
            cache_read_tokens: self.cache_read_tokens.saturating_add(other.cache_read_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
        }
    }
}

/// A single assistant turn's token usage, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: String,
    pub ts: String,
    pub session_id: String,
    pub model: String,
    pub usage: UsageTotals,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: format_ts(start),
            end: format_ts(end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    FiveHour,
    SevenDay,
}

impl WindowKind {
    pub const ALL: [WindowKind; 2] = [WindowKind::FiveHour, WindowKind::SevenDay];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveHour => "5h",
            Self::SevenDay => "7d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::FiveHour => Duration::hours(5),
            Self::SevenDay => Duration::days(7),
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "5h" | "five_hour" => Ok(Self::FiveHour),
            "7d" | "seven_day" => Ok(Self::SevenDay),
            other => Err(format!("unknown window {}", other)),
        }
    }
}

/// Derived view of one window; recomputed from the store on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub window: WindowKind,
    pub range: TimeRange,
    pub totals: UsageTotals,
    pub message_count: u64,
    pub by_model: BTreeMap<String, UsageTotals>,
}

impl WindowSnapshot {
    pub fn empty(window: WindowKind, range: TimeRange) -> Self {
        Self {
            window,
            range,
            totals: UsageTotals::default(),
            message_count: 0,
            by_model: BTreeMap::new(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.totals.total_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryBucket {
    pub bucket_start: String,
    pub usage: UsageTotals,
    pub message_count: u64,
}

impl HistoryBucket {
    pub fn empty(bucket_start: String) -> Self {
        Self {
            bucket_start,
            usage: UsageTotals::default(),
            message_count: 0,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage.total_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub window: WindowKind,
    pub official_percent: f64,
    pub derived_limit: Option<u64>,
    pub resets_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

impl CalibrationRecord {
    /// Usage implied by the external percentage, when a limit is known.
    pub fn estimated_usage(&self) -> Option<u64> {
        let limit = self.derived_limit?;
        if !self.official_percent.is_finite() || self.official_percent < 0.0 {
            return None;
        }
        Some(((self.official_percent / 100.0) * limit as f64).round() as u64)
    }
}

/// Calibration as seen by consumers at a given instant.
///
/// `likely_reset` is an approximation: a low official percentage while the
/// local aggregate is still high usually means the window rolled over before
/// the local data caught up. It annotates, it does not correct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStatus {
    pub window: WindowKind,
    pub record: Option<CalibrationRecord>,
    pub is_stale: bool,
    pub likely_reset: bool,
}

impl CalibrationStatus {
    pub fn unavailable(window: WindowKind) -> Self {
        Self {
            window,
            record: None,
            is_stale: false,
            likely_reset: false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.record.is_some()
    }

    pub fn derived_limit(&self) -> Option<u64> {
        self.record.as_ref().and_then(|record| record.derived_limit)
    }

    pub fn resets_at(&self) -> Option<DateTime<Utc>> {
        self.record.as_ref().and_then(|record| record.resets_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub window: WindowKind,
    pub current_total: u64,
    pub local_total: u64,
    pub used_external_estimate: bool,
    pub effective_limit: Option<u64>,
    pub resets_at: String,
    pub time_remaining_minutes: f64,
    pub session: Projection,
    pub historical: Projection,
}

impl ForecastResult {
    pub fn critical(&self) -> bool {
        self.session.critical || self.historical.critical
    }
}

pub fn format_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn session_id_from_source(source: &str) -> String {
    Path::new(source)
        .file_stem()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| source.to_string())
}
