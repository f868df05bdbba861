mod calibration;
mod forecast;
mod ingest;
mod windows;

use std::sync::Arc;

use crate::calibration::{CalibrationCache, CalibrationSource, UsageFileSource};
use crate::config::AppConfig;
use crate::error::Result;
use tokenboard_db::Db;

pub use calibration::{CalibrationService, FetchGuard};
pub use forecast::ForecastService;
pub use ingest::IngestService;
pub use windows::WindowService;

type SharedConfig = Arc<AppConfig>;

/// Service registry for app-level operations.
///
/// Every service holds a clone of the same `CalibrationCache`, so a reading
/// applied through `calibration` is immediately visible to `windows` and
/// `forecast`.
#[derive(Clone)]
pub struct AppServices {
    pub ingest: IngestService,
    pub windows: WindowService,
    pub calibration: CalibrationService,
    pub forecast: ForecastService,
}

impl AppServices {
    pub fn new(config: &AppConfig) -> Self {
        let source = config
            .calibration_file
            .as_ref()
            .map(|path| Arc::new(UsageFileSource::new(path)) as Arc<dyn CalibrationSource>);
        Self::with_source(config, source)
    }

    pub fn with_source(config: &AppConfig, source: Option<Arc<dyn CalibrationSource>>) -> Self {
        let shared = Arc::new(config.clone());
        let cache =
            CalibrationCache::new(config.calibration_stale_after(), config.low_usage_percent);
        let windows = WindowService::new(shared.clone(), cache.clone());
        Self {
            ingest: IngestService::new(shared.clone()),
            calibration: CalibrationService::new(cache.clone(), windows.clone(), source),
            forecast: ForecastService::new(shared, windows.clone(), cache),
            windows,
        }
    }
}

fn open_db(config: &SharedConfig) -> Result<Db> {
    Ok(Db::open(&config.db_path)?)
}
