use rusqlite::Row;
use tokenboard_core::UsageTotals;

use crate::error::{DbError, Result};
use crate::types::FileCursor;

/// Converts an unsigned counter for storage, refusing values SQLite would wrap.
pub(crate) fn to_sql_int(column: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| DbError::OutOfRange { column, value })
}

fn unsigned_at(row: &Row<'_>, index: usize) -> std::result::Result<u64, rusqlite::Error> {
    let value = row.get::<_, i64>(index)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(index, value))
}

/// Reads the five token columns starting at `offset`.
pub(crate) fn usage_from_row(
    row: &Row<'_>,
    offset: usize,
) -> std::result::Result<UsageTotals, rusqlite::Error> {
    Ok(UsageTotals {
        input_tokens: unsigned_at(row, offset)?,
        output_tokens: unsigned_at(row, offset + 1)?,
        cache_creation_tokens: unsigned_at(row, offset + 2)?,
        cache_read_tokens: unsigned_at(row, offset + 3)?,
        total_tokens: unsigned_at(row, offset + 4)?,
    })
}

pub(crate) fn row_to_cursor(row: &Row<'_>) -> std::result::Result<FileCursor, rusqlite::Error> {
    Ok(FileCursor {
        file_path: row.get(0)?,
        // Inodes are stored bit-for-bit; only equality matters.
        inode: row.get::<_, Option<i64>>(1)?.map(|value| value as u64),
        mtime_ms: row.get(2)?,
        file_size: unsigned_at(row, 3)?,
        byte_offset: unsigned_at(row, 4)?,
        active: row.get::<_, i64>(5)? != 0,
        last_error: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
