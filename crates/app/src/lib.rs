pub mod app;
pub mod calibration;
pub mod config;
pub mod error;
pub mod runner;
pub mod services;
pub mod startup;
pub mod util;

pub use app::AppState;
pub use calibration::{
    CalibrationCache, CalibrationError, CalibrationReading, CalibrationSource, UsageFileSource,
};
pub use config::{AppConfig, WeeklyReset};
pub use error::{AppError, Result};
pub use runner::{refresh_calibration, run_periodic};
pub use services::AppServices;
pub use startup::{AppPaths, default_data_dir, ensure_app_data_dir};
pub use util::time::{minutes_until, parse_utc};
