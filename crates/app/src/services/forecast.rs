use chrono::{DateTime, Utc};
use tokenboard_core::{ForecastResult, WindowKind, format_ts, least_squares_slope, project};
use tokenboard_db::Bucket;

use crate::calibration::CalibrationCache;
use crate::error::Result;
use crate::services::{SharedConfig, WindowService};
use crate::util::time::minutes_until;

#[derive(Clone)]
pub struct ForecastService {
    config: SharedConfig,
    windows: WindowService,
    calibration: CalibrationCache,
}

impl ForecastService {
    pub(super) fn new(
        config: SharedConfig,
        windows: WindowService,
        calibration: CalibrationCache,
    ) -> Self {
        Self {
            config,
            windows,
            calibration,
        }
    }

    /// Tokens per minute from the slope of cumulative hourly usage.
    pub fn session_rate(&self, now: DateTime<Utc>) -> Result<f64> {
        let hours = self.config.session_hours as usize;
        let buckets = self.windows.bucketed_history(Bucket::Hour, hours, now)?;
        let mut running = 0u64;
        let cumulative: Vec<f64> = buckets
            .iter()
            .map(|bucket| {
                running = running.saturating_add(bucket.total_tokens());
                running as f64
            })
            .collect();
        Ok(least_squares_slope(&cumulative) / 60.0)
    }

    /// Tokens per minute from the mean of active days.
    pub fn historical_rate(&self, now: DateTime<Utc>) -> Result<f64> {
        let days = self.config.history_days as usize;
        let buckets = self.windows.bucketed_history(Bucket::Day, days, now)?;
        let active: Vec<u64> = buckets
            .iter()
            .map(|bucket| bucket.total_tokens())
            .filter(|total| *total > 0)
            .collect();
        if active.is_empty() {
            return Ok(0.0);
        }
        let mean = active.iter().map(|total| *total as f64).sum::<f64>() / active.len() as f64;
        Ok(mean / 1440.0)
    }

    pub fn forecast(&self, window: WindowKind, now: DateTime<Utc>) -> Result<ForecastResult> {
        let snapshot = self.windows.totals(window, now)?;
        let local_total = snapshot.total_tokens();
        let calibration = self.calibration.current(window, now);

        let external = calibration
            .likely_reset
            .then(|| calibration.record.as_ref().and_then(|record| record.estimated_usage()))
            .flatten();
        let current_total = external.unwrap_or(local_total);
        let effective_limit = calibration
            .derived_limit()
            .or_else(|| self.config.fallback_limit(window));

        let resets_at = self.windows.reset_instant(window, now);
        let remaining = minutes_until(now, resets_at);
        let limit = effective_limit.map(|limit| limit as f64);

        let session = project(current_total as f64, limit, self.session_rate(now)?, remaining);
        let historical = project(
            current_total as f64,
            limit,
            self.historical_rate(now)?,
            remaining,
        );

        tracing::debug!(
            window = %window,
            current_total,
            limit = ?effective_limit,
            session = session.status.as_str(),
            historical = historical.status.as_str(),
            "forecast computed"
        );

        Ok(ForecastResult {
            window,
            current_total,
            local_total,
            used_external_estimate: external.is_some(),
            effective_limit,
            resets_at: format_ts(resets_at),
            time_remaining_minutes: remaining,
            session,
            historical,
        })
    }
}
