mod support;

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use support::{StubSource, fixed_now, insert_usage, setup_app, setup_app_with_source};
use tokenboard_app::{AppError, CalibrationReading, CalibrationSource};
use tokenboard_core::{ForecastStatus, WindowKind, format_ts};
use tokenboard_db::Bucket;

#[test]
fn five_hour_window_is_half_open() {
    let app = setup_app(|_| {});
    let now = fixed_now();
    insert_usage(&app, now - Duration::hours(5), 10, "claude-sonnet-4");
    insert_usage(&app, now - Duration::hours(5) - Duration::milliseconds(1), 1_000, "claude-sonnet-4");
    insert_usage(&app, now - Duration::minutes(1), 20, "claude-opus-4");
    insert_usage(&app, now, 5_000, "claude-opus-4");

    let snapshot = app
        .state
        .services
        .windows
        .totals(WindowKind::FiveHour, now)
        .expect("totals");
    assert_eq!(snapshot.total_tokens(), 30);
    assert_eq!(snapshot.message_count, 2);
    assert_eq!(snapshot.by_model.len(), 2);
    assert_eq!(snapshot.range.end, format_ts(now));
}

#[test]
fn empty_window_reports_zero() {
    let app = setup_app(|_| {});
    let snapshot = app
        .state
        .services
        .windows
        .totals(WindowKind::SevenDay, fixed_now())
        .expect("totals");
    assert_eq!(snapshot.total_tokens(), 0);
    assert_eq!(snapshot.message_count, 0);
    assert!(snapshot.by_model.is_empty());
}

#[test]
fn seven_day_window_ends_at_configured_weekly_reset() {
    let app = setup_app(|_| {});
    let now = fixed_now();
    let start = Utc.with_ymd_and_hms(2024, 12, 30, 0, 0, 0).unwrap();
    insert_usage(&app, start, 40, "claude-sonnet-4");
    insert_usage(&app, start - Duration::minutes(1), 900, "claude-sonnet-4");

    let windows = &app.state.services.windows;
    let (from, to) = windows.window_bounds(WindowKind::SevenDay, now);
    assert_eq!(from, start);
    assert_eq!(to, Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap());
    let snapshot = windows.totals(WindowKind::SevenDay, now).expect("totals");
    assert_eq!(snapshot.total_tokens(), 40);
}

#[test]
fn reset_instants_follow_calibration() {
    let source = Arc::new(StubSource::new());
    let app = setup_app_with_source(|_| {}, Some(source.clone() as Arc<dyn CalibrationSource>));
    let now = fixed_now();
    source.set(
        WindowKind::SevenDay,
        CalibrationReading {
            official_percent: 10.0,
            derived_limit: Some(1_000),
            resets_at: Some(Utc.with_ymd_and_hms(2024, 12, 20, 9, 0, 0).unwrap()),
        },
    );
    source.set(
        WindowKind::FiveHour,
        CalibrationReading {
            official_percent: 10.0,
            derived_limit: Some(1_000),
            resets_at: Some(now - Duration::minutes(10)),
        },
    );
    let services = &app.state.services;
    services
        .calibration
        .refresh(WindowKind::SevenDay, now)
        .expect("refresh 7d");
    services
        .calibration
        .refresh(WindowKind::FiveHour, now)
        .expect("refresh 5h");

    assert_eq!(
        services.windows.reset_instant(WindowKind::SevenDay, now),
        Utc.with_ymd_and_hms(2025, 1, 3, 9, 0, 0).unwrap()
    );
    assert_eq!(
        services.windows.reset_instant(WindowKind::FiveHour, now),
        now + Duration::hours(5)
    );
}

#[test]
fn bucketed_history_is_zero_filled_and_aligned() {
    let app = setup_app(|_| {});
    let now = fixed_now();
    insert_usage(&app, Utc.with_ymd_and_hms(2025, 1, 1, 11, 15, 0).unwrap(), 100, "m");
    insert_usage(&app, Utc.with_ymd_and_hms(2025, 1, 1, 9, 59, 0).unwrap(), 7, "m");

    let history = app
        .state
        .services
        .windows
        .bucketed_history(Bucket::Hour, 3, now)
        .expect("history");
    let starts: Vec<&str> = history.iter().map(|b| b.bucket_start.as_str()).collect();
    assert_eq!(
        starts,
        vec![
            "2025-01-01T10:00:00.000Z",
            "2025-01-01T11:00:00.000Z",
            "2025-01-01T12:00:00.000Z",
        ]
    );
    let totals: Vec<u64> = history.iter().map(|b| b.total_tokens()).collect();
    assert_eq!(totals, vec![0, 100, 0]);

    let days = app
        .state
        .services
        .windows
        .bucketed_history(Bucket::Day, 2, now)
        .expect("days");
    assert_eq!(days[0].bucket_start, "2024-12-31T00:00:00.000Z");
    assert_eq!(days[1].total_tokens(), 107);
}

#[test]
fn bucketed_history_rejects_oversized_requests() {
    let app = setup_app(|_| {});
    let windows = &app.state.services.windows;
    assert!(windows.bucketed_history(Bucket::Hour, 0, fixed_now()).expect("empty").is_empty());
    assert!(matches!(
        windows.bucketed_history(Bucket::Hour, 100_000, fixed_now()),
        Err(AppError::InvalidInput(_))
    ));
}

#[test]
fn failed_refresh_keeps_last_good_record() {
    let source = Arc::new(StubSource::new());
    let app = setup_app_with_source(|_| {}, Some(source.clone() as Arc<dyn CalibrationSource>));
    let now = fixed_now();
    source.set(
        WindowKind::FiveHour,
        CalibrationReading {
            official_percent: 40.0,
            derived_limit: Some(92_000_000),
            resets_at: Some(now + Duration::hours(2)),
        },
    );
    let calibration = &app.state.services.calibration;
    calibration
        .refresh(WindowKind::FiveHour, now)
        .expect("first refresh");

    source.set_failing(true);
    let later = now + Duration::minutes(1);
    assert!(calibration.refresh(WindowKind::FiveHour, later).is_err());

    let status = calibration.status(WindowKind::FiveHour, later);
    assert_eq!(status.derived_limit(), Some(92_000_000));
    assert!(!status.is_stale);

    let status = calibration.status(WindowKind::FiveHour, now + Duration::seconds(300));
    assert_eq!(status.derived_limit(), Some(92_000_000));
    assert!(status.is_stale);
}

#[test]
fn refresh_without_source_is_unavailable() {
    let app = setup_app(|_| {});
    let calibration = &app.state.services.calibration;
    assert!(!calibration.has_source());
    assert!(calibration.refresh(WindowKind::FiveHour, fixed_now()).is_err());
    assert!(!calibration.status(WindowKind::FiveHour, fixed_now()).is_available());
}

#[test]
fn missing_limit_is_derived_from_local_total() {
    let source = Arc::new(StubSource::new());
    let app = setup_app_with_source(|_| {}, Some(source.clone() as Arc<dyn CalibrationSource>));
    let now = fixed_now();
    // Reading covers [08:30, 13:30).
    insert_usage(&app, Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(), 600, "m");
    insert_usage(&app, Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(), 400, "m");
    insert_usage(&app, Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap(), 5_000, "m");
    source.set(
        WindowKind::FiveHour,
        CalibrationReading {
            official_percent: 25.0,
            derived_limit: None,
            resets_at: Some(now + Duration::hours(1)),
        },
    );

    let record = app
        .state
        .services
        .calibration
        .refresh(WindowKind::FiveHour, now)
        .expect("refresh");
    assert_eq!(record.derived_limit, Some(4_000));
}

#[test]
fn limit_is_not_derived_without_local_usage() {
    let source = Arc::new(StubSource::new());
    let app = setup_app_with_source(|_| {}, Some(source.clone() as Arc<dyn CalibrationSource>));
    source.set(
        WindowKind::SevenDay,
        CalibrationReading {
            official_percent: 30.0,
            derived_limit: None,
            resets_at: None,
        },
    );
    let record = app
        .state
        .services
        .calibration
        .refresh(WindowKind::SevenDay, fixed_now())
        .expect("refresh");
    assert_eq!(record.derived_limit, None);
    assert_eq!(record.official_percent, 30.0);
}

#[test]
fn forecast_without_usage_is_idle() {
    let app = setup_app(|config| config.five_hour_limit = Some(1_000));
    let forecast = app
        .state
        .services
        .forecast
        .forecast(WindowKind::FiveHour, fixed_now())
        .expect("forecast");
    assert_eq!(forecast.current_total, 0);
    assert_eq!(forecast.effective_limit, Some(1_000));
    assert_eq!(forecast.time_remaining_minutes, 300.0);
    assert_eq!(forecast.session.status, ForecastStatus::Idle);
    assert_eq!(forecast.historical.status, ForecastStatus::Idle);
    assert!(!forecast.critical());
}

fn seed_hourly_usage(app: &support::TestApp) {
    for hour in 7..=12 {
        insert_usage(app, Utc.with_ymd_and_hms(2025, 1, 1, hour, 10, 0).unwrap(), 50, "m");
    }
}

#[test]
fn forecast_flags_critical_against_fallback_limit() {
    let app = setup_app(|config| config.five_hour_limit = Some(100));
    seed_hourly_usage(&app);

    let forecast = app
        .state
        .services
        .forecast
        .forecast(WindowKind::FiveHour, fixed_now())
        .expect("forecast");
    assert_eq!(forecast.local_total, 250);
    assert!(!forecast.used_external_estimate);
    assert!((forecast.session.burn_rate_per_min - 50.0 / 60.0).abs() < 1e-9);
    assert_eq!(forecast.session.status, ForecastStatus::Critical);
    assert!(forecast.critical());
}

#[test]
fn forecast_without_any_limit_is_unknown() {
    let app = setup_app(|_| {});
    seed_hourly_usage(&app);
    let forecast = app
        .state
        .services
        .forecast
        .forecast(WindowKind::FiveHour, fixed_now())
        .expect("forecast");
    assert_eq!(forecast.effective_limit, None);
    assert_eq!(forecast.session.status, ForecastStatus::Unknown);
    assert!(!forecast.critical());
}

#[test]
fn calibrated_limit_overrides_fallback() {
    let source = Arc::new(StubSource::new());
    let app = setup_app_with_source(
        |config| config.five_hour_limit = Some(100),
        Some(source.clone() as Arc<dyn CalibrationSource>),
    );
    seed_hourly_usage(&app);
    let now = fixed_now();
    source.set(
        WindowKind::FiveHour,
        CalibrationReading {
            official_percent: 0.1,
            derived_limit: Some(1_000_000),
            resets_at: Some(now + Duration::hours(2)),
        },
    );
    let services = &app.state.services;
    services
        .calibration
        .refresh(WindowKind::FiveHour, now)
        .expect("refresh");

    let forecast = services
        .forecast
        .forecast(WindowKind::FiveHour, now)
        .expect("forecast");
    assert_eq!(forecast.effective_limit, Some(1_000_000));
    assert_eq!(forecast.time_remaining_minutes, 120.0);
    assert_eq!(forecast.session.status, ForecastStatus::Safe);
    assert_eq!(forecast.current_total, 250);
}

#[test]
fn likely_reset_switches_to_external_estimate() {
    let source = Arc::new(StubSource::new());
    let app = setup_app_with_source(
        |config| config.low_usage_percent = 5.0,
        Some(source.clone() as Arc<dyn CalibrationSource>),
    );
    seed_hourly_usage(&app);
    let now = fixed_now();
    source.set(
        WindowKind::FiveHour,
        CalibrationReading {
            official_percent: 1.0,
            derived_limit: Some(10_000),
            resets_at: Some(now + Duration::hours(2)),
        },
    );
    let services = &app.state.services;
    services
        .calibration
        .refresh(WindowKind::FiveHour, now)
        .expect("refresh");
    assert!(services.calibration.status(WindowKind::FiveHour, now).likely_reset);

    let forecast = services
        .forecast
        .forecast(WindowKind::FiveHour, now)
        .expect("forecast");
    assert!(forecast.used_external_estimate);
    assert_eq!(forecast.current_total, 100);
    assert_eq!(forecast.local_total, 250);
}

#[test]
fn huge_stale_threshold_never_marks_records_stale() {
    let source = Arc::new(StubSource::new());
    let app = setup_app_with_source(
        |config| config.calibration_stale_secs = u64::MAX,
        Some(source.clone() as Arc<dyn CalibrationSource>),
    );
    let now = fixed_now();
    source.set(
        WindowKind::FiveHour,
        CalibrationReading {
            official_percent: 10.0,
            derived_limit: Some(1_000),
            resets_at: None,
        },
    );
    let calibration = &app.state.services.calibration;
    calibration
        .refresh(WindowKind::FiveHour, now)
        .expect("refresh");
    let status = calibration.status(WindowKind::FiveHour, now + Duration::days(3650));
    assert!(!status.is_stale);
}
