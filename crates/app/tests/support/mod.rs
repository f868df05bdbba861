#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokenboard_app::{
    AppConfig, AppServices, AppState, CalibrationError, CalibrationReading, CalibrationSource,
};
use tokenboard_core::{UsageEvent, UsageTotals, WindowKind, format_ts};
use tokenboard_db::Db;

pub struct TestApp {
    pub _dir: TempDir,
    pub state: AppState,
    pub log_root: PathBuf,
}

/// Wednesday 2025-01-01 12:30 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 30, 0).unwrap()
}

pub fn test_config(dir: &TempDir) -> AppConfig {
    AppConfig {
        log_root: dir.path().join("projects"),
        db_path: dir.path().join("app.sqlite"),
        calibration_file: None,
        ..AppConfig::default()
    }
}

pub fn setup_app(config: impl FnOnce(&mut AppConfig)) -> TestApp {
    setup_app_with_source(config, None)
}

pub fn setup_app_with_source(
    config: impl FnOnce(&mut AppConfig),
    source: Option<Arc<dyn CalibrationSource>>,
) -> TestApp {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut app_config = test_config(&dir);
    config(&mut app_config);
    std::fs::create_dir_all(&app_config.log_root).expect("create log root");
    let services = AppServices::with_source(&app_config, source);
    let log_root = app_config.log_root.clone();
    let state = AppState::with_services(app_config, services);
    state.setup_db().expect("setup db");
    TestApp {
        _dir: dir,
        state,
        log_root,
    }
}

pub fn insert_usage(app: &TestApp, ts: DateTime<Utc>, total: u64, model: &str) {
    let mut db = Db::open(&app.state.config.db_path).expect("open db");
    let ts = format_ts(ts);
    let event = UsageEvent {
        id: format!("{}-{}-{}", ts, model, total),
        ts,
        session_id: "session".to_string(),
        model: model.to_string(),
        usage: UsageTotals::from_parts(total, 0, 0, 0),
        source: "/logs/session.jsonl".to_string(),
    };
    db.insert_usage_events(&[event]).expect("insert event");
}

pub fn assistant_line(ts: &str, input: u64, output: u64) -> String {
    format!(
        r#"{{"type":"assistant","timestamp":"{ts}","message":{{"model":"claude-sonnet-4","usage":{{"input_tokens":{input},"output_tokens":{output}}}}}}}"#
    )
}

/// Scripted calibration source.
#[derive(Default)]
pub struct StubSource {
    readings: Mutex<HashMap<WindowKind, CalibrationReading>>,
    failing: Mutex<bool>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set(&self, window: WindowKind, reading: CalibrationReading) {
        self.readings
            .lock()
            .expect("readings lock")
            .insert(window, reading);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("failing lock") = failing;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CalibrationSource for StubSource {
    fn fetch(&self, window: WindowKind) -> Result<CalibrationReading, CalibrationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if *self.failing.lock().expect("failing lock") {
            return Err(CalibrationError::Unavailable("upstream down".to_string()));
        }
        self.readings
            .lock()
            .expect("readings lock")
            .get(&window)
            .cloned()
            .ok_or_else(|| CalibrationError::Unavailable(format!("no reading for {window}")))
    }
}
