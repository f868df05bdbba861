mod file_source;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokenboard_core::{CalibrationRecord, CalibrationStatus, WindowKind};

pub use file_source::UsageFileSource;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration unavailable: {0}")]
    Unavailable(String),
    #[error("calibration io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("calibration parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("calibration timed out after {0}s")]
    Timeout(u64),
    #[error("previous {0} calibration fetch is still running")]
    InFlight(WindowKind),
}

/// One authoritative reading for a window.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReading {
    pub official_percent: f64,
    pub derived_limit: Option<u64>,
    pub resets_at: Option<DateTime<Utc>>,
}

/// Opaque provider of authoritative usage percentages.
///
/// Implementations may block; callers run them off the async executor and
/// bound them with a timeout. A blocking fetch cannot be cancelled, so one that
/// outlives its timeout keeps running to completion; the runner holds a
/// per-window in-flight flag until it returns and refuses to start another.
pub trait CalibrationSource: Send + Sync {
    fn fetch(&self, window: WindowKind) -> Result<CalibrationReading, CalibrationError>;
}

/// Latest calibration record per window, shared by every consumer.
///
/// A record is only ever replaced by a newer successful reading. Failed
/// fetches leave it in place, so consumers keep an aging but authoritative
/// value and see `is_stale` once it passes the threshold.
#[derive(Clone)]
pub struct CalibrationCache {
    records: Arc<RwLock<HashMap<WindowKind, CalibrationRecord>>>,
    stale_after: Duration,
    low_usage_percent: f64,
}

impl CalibrationCache {
    pub fn new(stale_after: Duration, low_usage_percent: f64) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            stale_after,
            low_usage_percent,
        }
    }

    pub fn update(&self, window: WindowKind, record: CalibrationRecord) {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.insert(window, record);
    }

    pub fn record(&self, window: WindowKind) -> Option<CalibrationRecord> {
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.get(&window).cloned()
    }

    pub fn current(&self, window: WindowKind, now: DateTime<Utc>) -> CalibrationStatus {
        let Some(record) = self.record(window) else {
            return CalibrationStatus::unavailable(window);
        };
        let is_stale = now - record.fetched_at >= self.stale_after;
        let likely_reset = record.official_percent < self.low_usage_percent;
        CalibrationStatus {
            window,
            record: Some(record),
            is_stale,
            likely_reset,
        }
    }
}
