use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokenboard_core::{CalibrationRecord, CalibrationStatus, TimeRange, WindowKind};

use crate::calibration::{CalibrationCache, CalibrationError, CalibrationReading, CalibrationSource};
use crate::error::Result;
use crate::services::WindowService;

#[derive(Clone)]
pub struct CalibrationService {
    cache: CalibrationCache,
    windows: WindowService,
    source: Option<Arc<dyn CalibrationSource>>,
    in_flight: Arc<[AtomicBool; 2]>,
}

/// Marks a window's fetch as running until dropped.
pub struct FetchGuard {
    flags: Arc<[AtomicBool; 2]>,
    slot: usize,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        self.flags[self.slot].store(false, Ordering::Release);
    }
}

fn fetch_slot(window: WindowKind) -> usize {
    match window {
        WindowKind::FiveHour => 0,
        WindowKind::SevenDay => 1,
    }
}

impl CalibrationService {
    pub(super) fn new(
        cache: CalibrationCache,
        windows: WindowService,
        source: Option<Arc<dyn CalibrationSource>>,
    ) -> Self {
        Self {
            cache,
            windows,
            source,
            in_flight: Arc::new([AtomicBool::new(false), AtomicBool::new(false)]),
        }
    }

    /// Claims the window's fetch slot, or `InFlight` while an earlier fetch
    /// has not returned yet.
    pub fn begin_fetch(&self, window: WindowKind) -> std::result::Result<FetchGuard, CalibrationError> {
        let slot = fetch_slot(window);
        self.in_flight[slot]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CalibrationError::InFlight(window))?;
        Ok(FetchGuard {
            flags: self.in_flight.clone(),
            slot,
        })
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn cache(&self) -> &CalibrationCache {
        &self.cache
    }

    pub fn status(&self, window: WindowKind, now: DateTime<Utc>) -> CalibrationStatus {
        self.cache.current(window, now)
    }

    /// Asks the source for a reading. Blocking; never touches the cache.
    pub fn fetch(&self, window: WindowKind) -> std::result::Result<CalibrationReading, CalibrationError> {
        match self.source.as_ref() {
            Some(source) => source.fetch(window),
            None => Err(CalibrationError::Unavailable(
                "no calibration source configured".to_string(),
            )),
        }
    }

    /// Turns a successful reading into the window's new record.
    ///
    /// When the source reports a percentage but no limit, the limit is
    /// derived from the local total over the window the reading refers to.
    pub fn apply_reading(
        &self,
        window: WindowKind,
        reading: CalibrationReading,
        now: DateTime<Utc>,
    ) -> Result<CalibrationRecord> {
        let derived_limit = match reading.derived_limit {
            Some(limit) => Some(limit),
            None => self.derive_limit(window, &reading, now)?,
        };
        let record = CalibrationRecord {
            window,
            official_percent: reading.official_percent,
            derived_limit,
            resets_at: reading.resets_at,
            fetched_at: now,
        };
        self.cache.update(window, record.clone());
        tracing::debug!(
            window = %window,
            percent = record.official_percent,
            limit = ?record.derived_limit,
            "calibration updated"
        );
        Ok(record)
    }

    /// Fetches and applies in one blocking call.
    pub fn refresh(&self, window: WindowKind, now: DateTime<Utc>) -> Result<CalibrationRecord> {
        let reading = self.fetch(window)?;
        self.apply_reading(window, reading, now)
    }

    fn derive_limit(
        &self,
        window: WindowKind,
        reading: &CalibrationReading,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>> {
        let percent = reading.official_percent;
        if !percent.is_finite() || percent <= 0.0 {
            return Ok(None);
        }
        let range = match reading.resets_at {
            Some(resets_at) => TimeRange::between(resets_at - window.duration(), resets_at),
            None => self.windows.window_range(window, now),
        };
        let local_total = self.windows.totals_in(window, range)?.total_tokens();
        if local_total == 0 {
            return Ok(None);
        }
        let limit = (local_total as f64 / (percent / 100.0)).round();
        if !limit.is_finite() || limit <= 0.0 {
            return Ok(None);
        }
        tracing::trace!(window = %window, local_total, percent, "derived limit from local total");
        Ok(Some(limit as u64))
    }
}
