use std::path::PathBuf;
use std::time::Duration;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tokenboard_core::WindowKind;

use crate::error::{AppError, Result};
use crate::startup::default_data_dir;

pub const DB_FILE_NAME: &str = "tokenboard.sqlite";
/// Upper bound for every `*_secs` setting (one leap year).
pub const MAX_PERIOD_SECS: u64 = 366 * 24 * 60 * 60;

/// Weekly boundary used for the seven-day window when no calibration is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyReset {
    pub weekday: Weekday,
    pub hour: u32,
}

impl Default for WeeklyReset {
    fn default() -> Self {
        Self {
            weekday: Weekday::Mon,
            hour: 0,
        }
    }
}

/// Runtime settings shared by every service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_root: PathBuf,
    pub db_path: PathBuf,
    pub ingest_interval_secs: u64,
    pub calibration_interval_secs: u64,
    pub calibration_timeout_secs: u64,
    pub calibration_stale_secs: u64,
    /// Official percentages below this mark a window as likely reset. 0 disables.
    pub low_usage_percent: f64,
    pub weekly_reset: WeeklyReset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub five_hour_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seven_day_limit: Option<u64>,
    pub session_hours: u32,
    pub history_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_root: ingest::default_log_root(),
            db_path: default_data_dir().join(DB_FILE_NAME),
            ingest_interval_secs: 5,
            calibration_interval_secs: 60,
            calibration_timeout_secs: 10,
            calibration_stale_secs: 300,
            low_usage_percent: 0.0,
            weekly_reset: WeeklyReset::default(),
            five_hour_limit: None,
            seven_day_limit: None,
            session_hours: 6,
            history_days: 7,
            calibration_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingest_interval_secs)
    }

    pub fn calibration_interval(&self) -> Duration {
        Duration::from_secs(self.calibration_interval_secs)
    }

    pub fn calibration_timeout(&self) -> Duration {
        Duration::from_secs(self.calibration_timeout_secs)
    }

    /// Age at which a calibration record is reported stale.
    pub fn calibration_stale_after(&self) -> chrono::Duration {
        i64::try_from(self.calibration_stale_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn fallback_limit(&self, window: WindowKind) -> Option<u64> {
        match window {
            WindowKind::FiveHour => self.five_hour_limit,
            WindowKind::SevenDay => self.seven_day_limit,
        }
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(path) = non_empty("CLAUDE_DATA_PATH") {
            self.log_root = PathBuf::from(path).join("projects");
        }
        if let Some(path) = non_empty("TOKENBOARD_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(value) = non_empty("FIVE_HOUR_LIMIT_TOKENS") {
            let limit = value.trim().parse::<u64>().map_err(|_| {
                AppError::InvalidInput(format!("invalid FIVE_HOUR_LIMIT_TOKENS: {value}"))
            })?;
            self.five_hour_limit = Some(limit);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest_interval_secs == 0 {
            return Err(AppError::InvalidInput(
                "ingest_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.calibration_interval_secs == 0 || self.calibration_timeout_secs == 0 {
            return Err(AppError::InvalidInput(
                "calibration interval and timeout must be at least 1 second".to_string(),
            ));
        }
        for (name, value) in [
            ("ingest_interval_secs", self.ingest_interval_secs),
            ("calibration_interval_secs", self.calibration_interval_secs),
            ("calibration_timeout_secs", self.calibration_timeout_secs),
            ("calibration_stale_secs", self.calibration_stale_secs),
        ] {
            if value > MAX_PERIOD_SECS {
                return Err(AppError::InvalidInput(format!(
                    "{} must be at most {}, got {}",
                    name, MAX_PERIOD_SECS, value
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.low_usage_percent) {
            return Err(AppError::InvalidInput(format!(
                "low_usage_percent must be within 0..=100, got {}",
                self.low_usage_percent
            )));
        }
        if self.weekly_reset.hour > 23 {
            return Err(AppError::InvalidInput(format!(
                "weekly_reset.hour must be within 0..=23, got {}",
                self.weekly_reset.hour
            )));
        }
        Ok(())
    }
}
