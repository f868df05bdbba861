use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokenboard_core::WindowKind;

use super::{CalibrationError, CalibrationReading, CalibrationSource};

#[derive(Debug, Deserialize)]
struct UsageDocument {
    five_hour: Option<WindowUsage>,
    seven_day: Option<WindowUsage>,
}

#[derive(Debug, Deserialize)]
struct WindowUsage {
    utilization: Option<f64>,
    resets_at: Option<String>,
    limit: Option<u64>,
}

/// Reads an OAuth-usage shaped JSON document written by an external tool:
/// `{"five_hour": {"utilization": 36.0, "resets_at": "..."}, "seven_day": {...}}`.
#[derive(Debug, Clone)]
pub struct UsageFileSource {
    path: PathBuf,
}

impl UsageFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CalibrationSource for UsageFileSource {
    fn fetch(&self, window: WindowKind) -> Result<CalibrationReading, CalibrationError> {
        let contents = fs::read_to_string(&self.path)?;
        let document: UsageDocument = serde_json::from_str(&contents)?;
        let usage = match window {
            WindowKind::FiveHour => document.five_hour,
            WindowKind::SevenDay => document.seven_day,
        }
        .ok_or_else(|| CalibrationError::Unavailable(format!("no {} entry", window)))?;
        let official_percent = usage
            .utilization
            .filter(|value| value.is_finite() && *value >= 0.0)
            .ok_or_else(|| CalibrationError::Unavailable(format!("no {} utilization", window)))?;
        // An unparseable reset time degrades to "unknown" rather than failing the reading.
        let resets_at = usage.resets_at.as_deref().and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc))
        });
        Ok(CalibrationReading {
            official_percent,
            derived_limit: usage.limit.filter(|limit| *limit > 0),
            resets_at,
        })
    }
}
