use crate::error::Result;
use crate::services::{SharedConfig, open_db};
use ingest::IngestStats;
use tokenboard_db::Db;

#[derive(Clone)]
pub struct IngestService {
    config: SharedConfig,
}

impl IngestService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    /// One tail-parse-commit cycle over the configured log root.
    pub fn run(&self) -> Result<IngestStats> {
        let mut db = self.db()?;
        Ok(ingest::ingest_log_root(&mut db, &self.config.log_root)?)
    }

    /// Forgets all cursors so the next cycle re-reads every file. Stored
    /// events are kept and replays are absorbed by dedup.
    pub fn rescan(&self) -> Result<IngestStats> {
        let db = self.db()?;
        let forgotten = db.reset_cursors()?;
        tracing::info!(cursors = forgotten, "cleared file cursors for full rescan");
        drop(db);
        self.run()
    }

    pub fn record_count(&self) -> Result<u64> {
        Ok(self.db()?.count_usage_events()?)
    }

    pub fn latest_event_ts(&self) -> Result<Option<String>> {
        Ok(self.db()?.latest_event_ts()?)
    }
}
