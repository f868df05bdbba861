use std::collections::HashMap;

use chrono::{DateTime, Duration, DurationRound, Utc};
use tokenboard_core::{
    HistoryBucket, TimeRange, WindowKind, WindowSnapshot, format_ts, next_weekly_boundary,
    roll_forward,
};
use tokenboard_db::{Bucket, Db};

use crate::calibration::CalibrationCache;
use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_db};

const MAX_HISTORY_BUCKETS: usize = 24 * 366;

fn bucket_step(bucket: Bucket) -> Duration {
    match bucket {
        Bucket::Hour => Duration::hours(1),
        Bucket::Day => Duration::days(1),
    }
}

/// Rolling-window and bucketed-history queries over the store.
#[derive(Clone)]
pub struct WindowService {
    config: SharedConfig,
    calibration: CalibrationCache,
}

impl WindowService {
    pub(super) fn new(config: SharedConfig, calibration: CalibrationCache) -> Self {
        Self {
            config,
            calibration,
        }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    /// Next reset of `window` as of `now`.
    ///
    /// Calibration wins when it knows the instant. A weekly reset already in
    /// the past is rolled forward in 7-day steps; a stale five-hour reset is
    /// discarded in favour of a full window from `now`.
    pub fn reset_instant(&self, window: WindowKind, now: DateTime<Utc>) -> DateTime<Utc> {
        let known = self.calibration.current(window, now).resets_at();
        match window {
            WindowKind::FiveHour => known
                .filter(|resets_at| *resets_at > now)
                .unwrap_or(now + window.duration()),
            WindowKind::SevenDay => match known {
                Some(resets_at) => roll_forward(resets_at, window.duration(), now),
                None => next_weekly_boundary(
                    now,
                    self.config.weekly_reset.weekday,
                    self.config.weekly_reset.hour,
                ),
            },
        }
    }

    /// Concrete `[start, end)` bounds of `window` as of `now`.
    pub fn window_bounds(
        &self,
        window: WindowKind,
        now: DateTime<Utc>,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        match window {
            WindowKind::FiveHour => (now - window.duration(), now),
            WindowKind::SevenDay => {
                let anchor = self.reset_instant(window, now);
                (anchor - window.duration(), anchor)
            }
        }
    }

    pub fn window_range(&self, window: WindowKind, now: DateTime<Utc>) -> TimeRange {
        let (start, end) = self.window_bounds(window, now);
        TimeRange::between(start, end)
    }

    pub fn totals(&self, window: WindowKind, now: DateTime<Utc>) -> Result<WindowSnapshot> {
        let range = self.window_range(window, now);
        self.totals_in(window, range)
    }

    pub(crate) fn totals_in(&self, window: WindowKind, range: TimeRange) -> Result<WindowSnapshot> {
        let db = self.db()?;
        let totals = db.window_totals(&range)?;
        Ok(WindowSnapshot {
            window,
            range,
            totals: totals.totals,
            message_count: totals.message_count,
            by_model: totals.by_model,
        })
    }

    /// The `count` most recent calendar buckets (UTC), ending with the one
    /// that contains `now`. Buckets without events report zero.
    pub fn bucketed_history(
        &self,
        bucket: Bucket,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<HistoryBucket>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if count > MAX_HISTORY_BUCKETS {
            return Err(AppError::InvalidInput(format!(
                "bucket count must be at most {}, got {}",
                MAX_HISTORY_BUCKETS, count
            )));
        }
        let step = bucket_step(bucket);
        let current = now
            .duration_trunc(step)
            .map_err(|err| AppError::Message(format!("align bucket: {}", err)))?;
        let end = current + step;
        let start = end - step * count as i32;

        let db = self.db()?;
        let mut found: HashMap<String, HistoryBucket> = db
            .bucket_totals(&TimeRange::between(start, end), bucket)?
            .into_iter()
            .map(|entry| (entry.bucket_start.clone(), entry))
            .collect();

        Ok((0..count)
            .map(|index| {
                let key = format_ts(start + step * index as i32);
                found
                    .remove(&key)
                    .unwrap_or_else(|| HistoryBucket::empty(key))
            })
            .collect())
    }
}
