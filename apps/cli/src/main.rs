mod args;
mod config;
mod dirs;
mod logging;

use std::io;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokenboard_app::{AppState, ensure_app_data_dir, parse_utc, refresh_calibration, run_periodic};
use tokenboard_core::{
    CalibrationStatus, ForecastResult, HistoryBucket, Projection, WindowKind, WindowSnapshot,
    format_minutes,
};
use tokenboard_db::Bucket;
use tokio::sync::watch;

use crate::args::Command;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = args::parse_args().map_err(|err| {
        eprintln!("{err}");
        args::print_help();
        io::Error::new(io::ErrorKind::InvalidInput, "invalid arguments")
    })?;

    let loaded = config::load_or_create(args.config_path.as_deref()).map_err(io::Error::other)?;
    logging::init_logging(&loaded.config.log_level);
    if loaded.created {
        tracing::info!(path = %loaded.file.display(), "created default config");
    }

    let data_dir = dirs::resolve_data_dir(&loaded.config);
    if data_dir.matched_existing {
        tracing::debug!(dir = %data_dir.paths.app_data_dir.display(), "using existing data dir");
    } else {
        tracing::info!(dir = %data_dir.paths.app_data_dir.display(), "using new data dir");
    }
    ensure_app_data_dir(&data_dir.paths)?;

    let now = match args.at.as_deref() {
        Some(value) => parse_utc(value)?,
        None => Utc::now(),
    };

    let state = AppState::new(loaded.config);
    match args.command {
        Command::Run => run(state).await?,
        Command::Ingest { rescan } => ingest(state, rescan).await?,
        Command::Status { json } => status(state, now, json).await?,
        Command::History {
            bucket,
            count,
            json,
        } => history(state, bucket, count, now, json).await?,
    }
    Ok(())
}

async fn run(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let init_state = state.clone();
    let stats = tokio::task::spawn_blocking(move || init_state.initialize()).await??;
    tracing::info!(
        files = stats.files_scanned,
        inserted = stats.events_inserted,
        "startup ingest finished"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
        let _ = shutdown_tx.send(true);
    });

    println!("TokenBoard is tracking {}", state.config.log_root.display());
    println!("Press Ctrl+C to stop.");
    run_periodic(state, shutdown_rx).await?;
    tracing::info!("stopped");
    Ok(())
}

async fn ingest(state: AppState, rescan: bool) -> Result<(), Box<dyn std::error::Error>> {
    let stats = tokio::task::spawn_blocking(move || -> tokenboard_app::Result<_> {
        state.setup_db()?;
        if rescan {
            state.services.ingest.rescan()
        } else {
            state.services.ingest.run()
        }
    })
    .await??;

    println!(
        "scanned {} files ({} unchanged, {} restarted, {} failed)",
        stats.files_scanned, stats.files_skipped, stats.files_reset, stats.files_failed
    );
    println!(
        "parsed {} events, stored {} new, {} parse errors, {} bytes read",
        stats.events_parsed, stats.events_inserted, stats.parse_errors, stats.bytes_read
    );
    for issue in &stats.issues {
        eprintln!("{}: {}", issue.file_path, issue.message);
    }
    Ok(())
}

#[derive(Serialize)]
struct WindowReport {
    snapshot: WindowSnapshot,
    forecast: ForecastResult,
    calibration: CalibrationStatus,
}

#[derive(Serialize)]
struct StatusReport {
    generated_at: String,
    record_count: u64,
    latest_event_ts: Option<String>,
    windows: Vec<WindowReport>,
}

async fn status(
    state: AppState,
    now: DateTime<Utc>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let init_state = state.clone();
    tokio::task::spawn_blocking(move || init_state.initialize()).await??;

    if state.services.calibration.has_source() {
        let timeout = state.config.calibration_timeout();
        for window in WindowKind::ALL {
            if let Err(err) = refresh_calibration(&state.services, window, timeout).await {
                tracing::warn!(window = %window, error = %err, "calibration unavailable");
            }
        }
    }

    let report = tokio::task::spawn_blocking(move || -> tokenboard_app::Result<StatusReport> {
        let services = &state.services;
        let mut windows = Vec::new();
        for window in WindowKind::ALL {
            windows.push(WindowReport {
                snapshot: services.windows.totals(window, now)?,
                forecast: services.forecast.forecast(window, now)?,
                calibration: services.calibration.status(window, now),
            });
        }
        Ok(StatusReport {
            generated_at: tokenboard_core::format_ts(now),
            record_count: services.ingest.record_count()?,
            latest_event_ts: services.ingest.latest_event_ts()?,
            windows,
        })
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for window in &report.windows {
        print_window(window);
        println!();
    }
    println!(
        "records {} (latest {})",
        report.record_count,
        report.latest_event_ts.as_deref().unwrap_or("-")
    );
    Ok(())
}

fn print_window(report: &WindowReport) {
    let snapshot = &report.snapshot;
    let forecast = &report.forecast;
    let totals = &snapshot.totals;
    println!(
        "{} window  {} .. {}",
        snapshot.window, snapshot.range.start, snapshot.range.end
    );
    println!(
        "  tokens       {} over {} messages (input {}, output {}, cache write {}, cache read {})",
        totals.total_tokens,
        snapshot.message_count,
        totals.input_tokens,
        totals.output_tokens,
        totals.cache_creation_tokens,
        totals.cache_read_tokens
    );
    if forecast.used_external_estimate {
        println!("  estimate     {} (window likely reset)", forecast.current_total);
    }
    let limit = forecast
        .effective_limit
        .map(|limit| limit.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "  limit        {}  resets {} (in {})",
        limit,
        forecast.resets_at,
        format_minutes(forecast.time_remaining_minutes)
    );
    print_projection("session", &forecast.session);
    print_projection("historical", &forecast.historical);
    match &report.calibration.record {
        Some(record) => println!(
            "  calibration  {:.1}% as of {}{}{}",
            record.official_percent,
            tokenboard_core::format_ts(record.fetched_at),
            if report.calibration.is_stale { ", stale" } else { "" },
            if report.calibration.likely_reset { ", likely reset" } else { "" },
        ),
        None => println!("  calibration  unavailable"),
    }
}

fn print_projection(label: &str, projection: &Projection) {
    let time_to_limit = projection
        .time_to_limit_minutes
        .map(format_minutes)
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {:<12} {:.1} tok/min  {}  projected {:.0}  limit in {}",
        label,
        projection.burn_rate_per_min,
        projection.status.as_str(),
        projection.projected_total,
        time_to_limit
    );
}

async fn history(
    state: AppState,
    bucket: Bucket,
    count: usize,
    now: DateTime<Utc>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let buckets = tokio::task::spawn_blocking(move || -> tokenboard_app::Result<Vec<HistoryBucket>> {
        state.initialize()?;
        state.services.windows.bucketed_history(bucket, count, now)
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&buckets)?);
        return Ok(());
    }
    for entry in &buckets {
        println!(
            "{}  {:>12}  {:>6} msgs",
            entry.bucket_start,
            entry.total_tokens(),
            entry.message_count
        );
    }
    Ok(())
}
