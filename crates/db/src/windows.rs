use rusqlite::params;
use tokenboard_core::{HistoryBucket, TimeRange};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::usage_from_row;
use crate::types::{Bucket, WindowTotals};

// Every range query is pinned to the timestamp index and uses the half-open
// convention `start <= ts < end`.

fn check_range(range: &TimeRange) -> Result<()> {
    if range.start > range.end {
        return Err(DbError::InvalidRange {
            start: range.start.clone(),
            end: range.end.clone(),
        });
    }
    Ok(())
}

impl Db {
    /// Sums usage in `range`, broken down by model.
    pub fn window_totals(&self, range: &TimeRange) -> Result<WindowTotals> {
        check_range(range)?;
        let mut stmt = self.conn.prepare(
            r#"
            SELECT model,
                   COUNT(*),
                   COALESCE(SUM(input_tokens), 0),
                   COALESCE(SUM(output_tokens), 0),
                   COALESCE(SUM(cache_creation_tokens), 0),
                   COALESCE(SUM(cache_read_tokens), 0),
                   COALESCE(SUM(total_tokens), 0)
            FROM usage_event INDEXED BY idx_usage_event_ts
            WHERE ts >= ?1 AND ts < ?2
            GROUP BY model
            ORDER BY model ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![range.start, range.end], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as u64,
                    usage_from_row(row, 2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut window = WindowTotals::default();
        for (model, count, usage) in rows {
            window.totals = window.totals.add(usage);
            window.message_count += count;
            window.by_model.insert(model, usage);
        }
        Ok(window)
    }

    /// Non-empty calendar buckets (UTC) that intersect `range`, oldest first.
    pub fn bucket_totals(&self, range: &TimeRange, bucket: Bucket) -> Result<Vec<HistoryBucket>> {
        check_range(range)?;
        let mut stmt = self.conn.prepare(
            r#"
            SELECT substr(ts, 1, ?3) AS bucket_key,
                   COUNT(*),
                   COALESCE(SUM(input_tokens), 0),
                   COALESCE(SUM(output_tokens), 0),
                   COALESCE(SUM(cache_creation_tokens), 0),
                   COALESCE(SUM(cache_read_tokens), 0),
                   COALESCE(SUM(total_tokens), 0)
            FROM usage_event INDEXED BY idx_usage_event_ts
            WHERE ts >= ?1 AND ts < ?2
            GROUP BY bucket_key
            ORDER BY bucket_key ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![range.start, range.end, bucket.key_len()], |row| {
                Ok(HistoryBucket {
                    bucket_start: bucket.start_from_key(&row.get::<_, String>(0)?),
                    message_count: row.get::<_, i64>(1)? as u64,
                    usage: usage_from_row(row, 2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
