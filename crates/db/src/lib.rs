use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

mod error;
mod helpers;
mod ingest;
mod migrations;
mod types;
mod windows;

pub use error::{DbError, Result};
pub use types::{Bucket, FileCursor, WindowTotals};

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "cache_size", -20_000)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }
}
