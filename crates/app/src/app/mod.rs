use std::path::Path;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::services::AppServices;
use ingest::IngestStats;
use tokenboard_db::Db;

/// Application state shared by the CLI commands and the periodic runner.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: AppServices,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let services = AppServices::new(&config);
        Self { config, services }
    }

    pub fn with_services(config: AppConfig, services: AppServices) -> Self {
        Self { config, services }
    }

    pub fn is_fresh_db(&self) -> bool {
        !self.config.db_path.exists()
    }

    pub fn setup_db(&self) -> Result<()> {
        setup_db(&self.config.db_path)
    }

    /// Migrates the store and runs the first ingestion cycle. On a fresh
    /// database this is the full backfill of existing logs.
    pub fn initialize(&self) -> Result<IngestStats> {
        let is_fresh_db = self.is_fresh_db();
        self.setup_db()
            .map_err(|err| AppError::Message(format!("initialize db: {}", err)))?;
        if is_fresh_db {
            tracing::info!(
                log_root = %self.config.log_root.display(),
                "fresh database, importing existing logs"
            );
        }
        self.services.ingest.run()
    }
}

pub fn setup_db(path: &Path) -> Result<()> {
    let mut db = Db::open(path)?;
    db.migrate()?;
    Ok(())
}
