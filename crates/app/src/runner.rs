use std::time::Duration;

use chrono::Utc;
use tokenboard_core::{CalibrationRecord, WindowKind};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::app::AppState;
use crate::calibration::CalibrationError;
use crate::error::{AppError, Result};
use crate::services::AppServices;

/// Fetches one window's reading under `timeout`, then applies it.
///
/// Only the fetch is bounded; on timeout or failure the cache is left as it
/// was and the error is returned. A fetch abandoned by its timeout still holds
/// the window's in-flight flag, so later calls fail with `InFlight` until it
/// finishes.
pub async fn refresh_calibration(
    services: &AppServices,
    window: WindowKind,
    timeout: Duration,
) -> Result<CalibrationRecord> {
    let guard = services.calibration.begin_fetch(window)?;
    let calibration = services.calibration.clone();
    let fetch = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        calibration.fetch(window)
    });
    let reading = match time::timeout(timeout, fetch).await {
        Err(_) => return Err(CalibrationError::Timeout(timeout.as_secs()).into()),
        Ok(Err(join)) => return Err(AppError::Message(format!("calibration task: {}", join))),
        Ok(Ok(reading)) => reading?,
    };
    let calibration = services.calibration.clone();
    tokio::task::spawn_blocking(move || calibration.apply_reading(window, reading, Utc::now()))
        .await
        .map_err(|join| AppError::Message(format!("calibration task: {}", join)))?
}

async fn ingest_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = time::interval(state.config.ingest_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let ingest = state.services.ingest.clone();
                match tokio::task::spawn_blocking(move || ingest.run()).await {
                    Ok(Ok(stats)) => {
                        tracing::trace!(inserted = stats.events_inserted, "ingest tick");
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "ingest cycle failed, retrying next tick");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "ingest task panicked");
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }
    tracing::debug!("ingest loop stopped");
}

async fn calibration_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    if !state.services.calibration.has_source() {
        tracing::info!("no calibration source configured; using local totals only");
        return;
    }
    let timeout = state.config.calibration_timeout();
    let mut ticker = time::interval(state.config.calibration_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for window in WindowKind::ALL {
                    if let Err(err) = refresh_calibration(&state.services, window, timeout).await {
                        tracing::warn!(
                            window = %window,
                            error = %err,
                            "calibration unavailable, keeping previous record"
                        );
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }
    tracing::debug!("calibration loop stopped");
}

/// Runs the ingestion and calibration cycles until `shutdown` flips to true.
pub async fn run_periodic(state: AppState, shutdown: watch::Receiver<bool>) -> Result<()> {
    let ingest = tokio::spawn(ingest_loop(state.clone(), shutdown.clone()));
    let calibration = tokio::spawn(calibration_loop(state, shutdown));
    let (ingest, calibration) = tokio::join!(ingest, calibration);
    ingest.map_err(|err| AppError::Message(format!("ingest loop: {}", err)))?;
    calibration.map_err(|err| AppError::Message(format!("calibration loop: {}", err)))?;
    Ok(())
}
