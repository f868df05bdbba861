use rusqlite::{Connection, OptionalExtension, params};
use tokenboard_core::UsageEvent;

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{row_to_cursor, to_sql_int};
use crate::types::FileCursor;

const CURSOR_COLUMNS: &str =
    "file_path, inode, mtime_ms, file_size, byte_offset, active, last_error, updated_at";

impl Db {
    /// Inserts events, ignoring ids already present. Returns the number of new rows.
    pub fn insert_usage_events(&mut self, events: &[UsageEvent]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let inserted = insert_events(&tx, events)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Persists a cycle's events and cursor advances in a single transaction.
    ///
    /// Either everything lands or nothing does, so a failed cycle leaves the
    /// cursors where they were and the next cycle re-reads the same bytes.
    pub fn commit_ingest(&mut self, events: &[UsageEvent], cursors: &[FileCursor]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let inserted = insert_events(&tx, events)?;
        for cursor in cursors {
            upsert_cursor(&tx, cursor)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_cursor(&self, file_path: &str) -> Result<Option<FileCursor>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM file_cursor WHERE file_path = ?1",
                    CURSOR_COLUMNS
                ),
                params![file_path],
                row_to_cursor,
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn list_cursors(&self) -> Result<Vec<FileCursor>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM file_cursor ORDER BY file_path ASC",
            CURSOR_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], row_to_cursor)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn upsert_cursor(&self, cursor: &FileCursor) -> Result<()> {
        upsert_cursor(&self.conn, cursor)
    }

    /// Forgets every cursor; the next cycle re-reads all files from zero.
    pub fn reset_cursors(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM file_cursor", [])?)
    }

    pub fn count_usage_events(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM usage_event", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn latest_event_ts(&self) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT MAX(ts) FROM usage_event INDEXED BY idx_usage_event_ts",
                [],
                |row| row.get::<_, Option<String>>(0),
            )
            .map_err(DbError::from)
    }
}

fn insert_events(conn: &Connection, events: &[UsageEvent]) -> Result<usize> {
    if events.is_empty() {
        return Ok(0);
    }
    let mut inserted = 0usize;
    let mut stmt = conn.prepare(
        r#"
        INSERT OR IGNORE INTO usage_event (
          id, ts, session_id, model, input_tokens, output_tokens,
          cache_creation_tokens, cache_read_tokens, total_tokens, source
        ) VALUES (
          ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
        )
        "#,
    )?;
    for event in events {
        let usage = &event.usage;
        let rows = stmt.execute(params![
            event.id,
            event.ts,
            event.session_id,
            event.model,
            to_sql_int("input_tokens", usage.input_tokens)?,
            to_sql_int("output_tokens", usage.output_tokens)?,
            to_sql_int("cache_creation_tokens", usage.cache_creation_tokens)?,
            to_sql_int("cache_read_tokens", usage.cache_read_tokens)?,
            to_sql_int("total_tokens", usage.total_tokens)?,
            event.source,
        ])?;
        if rows > 0 {
            inserted += 1;
        }
    }
    Ok(inserted)
}

fn upsert_cursor(conn: &Connection, cursor: &FileCursor) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO file_cursor (
          file_path, inode, mtime_ms, file_size, byte_offset, active, last_error, updated_at
        ) VALUES (
          ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
        )
        ON CONFLICT(file_path) DO UPDATE SET
          inode = excluded.inode,
          mtime_ms = excluded.mtime_ms,
          file_size = excluded.file_size,
          byte_offset = excluded.byte_offset,
          active = excluded.active,
          last_error = excluded.last_error,
          updated_at = excluded.updated_at
        "#,
        params![
            cursor.file_path,
            cursor.inode.map(|value| value as i64),
            cursor.mtime_ms,
            to_sql_int("file_size", cursor.file_size)?,
            to_sql_int("byte_offset", cursor.byte_offset)?,
            cursor.active as i64,
            cursor.last_error,
            cursor.updated_at,
        ],
    )?;
    Ok(())
}
