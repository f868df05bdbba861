use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use rayon::prelude::*;
use tokenboard_core::{UsageEvent, session_id_from_source};
use tokenboard_db::{Db, FileCursor};
use walkdir::WalkDir;

use crate::parser::{LineOutcome, parse_usage_line};
use crate::types::{IngestIssue, IngestStats, Result};

fn is_log_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|value| value.to_str()),
        Some("jsonl")
    )
}

/// What to do with a file given its stored cursor and current metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPlan {
    Skip,
    Resume(u64),
    /// Truncated or replaced: forget the cursor and read from zero.
    Restart,
}

pub fn plan_read(
    cursor: Option<&FileCursor>,
    size: u64,
    mtime_ms: Option<i64>,
    inode: Option<u64>,
) -> ReadPlan {
    let Some(cursor) = cursor else {
        return if size == 0 {
            ReadPlan::Skip
        } else {
            ReadPlan::Resume(0)
        };
    };
    let replaced = matches!((cursor.inode, inode), (Some(prev), Some(now)) if prev != now);
    let shrunk = size < cursor.byte_offset || size < cursor.file_size;
    let mtime_moved_back =
        matches!((cursor.mtime_ms, mtime_ms), (Some(prev), Some(now)) if now < prev);
    if replaced || shrunk || mtime_moved_back {
        return ReadPlan::Restart;
    }
    if cursor.active && size == cursor.file_size && mtime_ms == cursor.mtime_ms {
        return ReadPlan::Skip;
    }
    ReadPlan::Resume(cursor.byte_offset)
}

struct FileTask {
    path: PathBuf,
    file_path: String,
    inode: Option<u64>,
    mtime_ms: Option<i64>,
    size: u64,
    start_offset: u64,
}

struct ParsedFile {
    file_path: String,
    inode: Option<u64>,
    mtime_ms: Option<i64>,
    size: u64,
    start_offset: u64,
    consumed: u64,
    events: Vec<UsageEvent>,
    parse_errors: usize,
    error: Option<String>,
    parse_duration: StdDuration,
}

impl ParsedFile {
    fn cursor(&self, updated_at: &str) -> FileCursor {
        FileCursor {
            file_path: self.file_path.clone(),
            inode: self.inode,
            mtime_ms: self.mtime_ms,
            file_size: self.size,
            byte_offset: self.start_offset.saturating_add(self.consumed),
            active: self.error.is_none(),
            last_error: self.error.clone(),
            updated_at: updated_at.to_string(),
        }
    }
}

fn open_at(path: &Path, offset: u64) -> std::io::Result<File> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(file)
}

fn parse_file(task: FileTask) -> ParsedFile {
    let file_start = Instant::now();
    let mut parsed = ParsedFile {
        file_path: task.file_path,
        inode: task.inode,
        mtime_ms: task.mtime_ms,
        size: task.size,
        start_offset: task.start_offset,
        consumed: 0,
        events: Vec::new(),
        parse_errors: 0,
        error: None,
        parse_duration: StdDuration::ZERO,
    };

    let file = match open_at(&task.path, task.start_offset) {
        Ok(file) => file,
        Err(err) => {
            parsed.error = Some(err.to_string());
            parsed.parse_duration = file_start.elapsed();
            return parsed;
        }
    };

    // Only read up to the size observed at discovery; later appends wait for
    // the next cycle so the stored size and offset stay consistent.
    let limit = task.size.saturating_sub(task.start_offset);
    let mut reader = BufReader::new(file.take(limit));
    let fallback_session = session_id_from_source(&parsed.file_path);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(bytes) => {
                if buf.last() != Some(&b'\n') {
                    // Partial trailing line: leave it for the next cycle.
                    break;
                }
                parsed.consumed = parsed.consumed.saturating_add(bytes as u64);
                let Ok(line) = std::str::from_utf8(&buf) else {
                    parsed.parse_errors += 1;
                    continue;
                };
                let line = line.trim_end_matches(&['\n', '\r'][..]);
                match parse_usage_line(line, &parsed.file_path, &fallback_session) {
                    LineOutcome::Event(event) => parsed.events.push(event),
                    LineOutcome::Ignored => {}
                    LineOutcome::Invalid(reason) => {
                        parsed.parse_errors += 1;
                        tracing::trace!(file = %parsed.file_path, %reason, "dropping invalid line");
                    }
                }
            }
            Err(err) => {
                parsed.error = Some(err.to_string());
                break;
            }
        }
    }

    parsed.parse_duration = file_start.elapsed();
    tracing::debug!(
        file = %parsed.file_path,
        read_ms = parsed.parse_duration.as_millis() as u64,
        events = parsed.events.len(),
        bytes = parsed.consumed,
        "parsed log file"
    );
    parsed
}

/// Files selected for reading by [`scan_log_root`], plus cursors already
/// decided during discovery (stat failures).
pub struct ScanPlan {
    tasks: Vec<FileTask>,
    cursors: Vec<FileCursor>,
    stats: IngestStats,
    now: String,
    started: Instant,
}

impl ScanPlan {
    /// Number of files that will be read.
    pub fn pending_files(&self) -> usize {
        self.tasks.len()
    }
}

/// Runs one ingestion cycle over every `*.jsonl` file under `root`.
///
/// Events and cursor advances are committed in one transaction; a store
/// failure aborts the cycle and leaves the previous cursors untouched.
pub fn ingest_log_root(db: &mut Db, root: &Path) -> Result<IngestStats> {
    let plan = scan_log_root(db, root)?;
    apply_scan(db, plan)
}

/// Discovery half of a cycle: walks `root` and compares every log file with
/// its stored cursor. Nothing is read or written yet.
pub fn scan_log_root(db: &Db, root: &Path) -> Result<ScanPlan> {
    let started = Instant::now();
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut stats = IngestStats::default();
    let mut tasks = Vec::new();
    let mut cursors = Vec::new();
    if !root.is_dir() {
        tracing::debug!(root = %root.display(), "log root missing, nothing to ingest");
        return Ok(ScanPlan {
            tasks,
            cursors,
            stats,
            now,
            started,
        });
    }

    let mut known: HashMap<String, FileCursor> = db
        .list_cursors()?
        .into_iter()
        .map(|cursor| (cursor.file_path.clone(), cursor))
        .collect();
    for entry in WalkDir::new(root).follow_links(false).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let file_path = err
                    .path()
                    .map(|path| path.to_string_lossy().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                tracing::warn!(file = %file_path, error = %err, "failed to walk log root");
                stats.issues.push(IngestIssue {
                    file_path,
                    message: err.to_string(),
                });
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !is_log_path(path) {
            continue;
        }
        stats.files_scanned += 1;
        let file_path = path.to_string_lossy().to_string();
        let cursor = known.remove(&file_path);
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                stats.files_failed += 1;
                tracing::warn!(file = %file_path, error = %err, "failed to stat log file");
                if let Some(mut cursor) = cursor {
                    cursor.active = false;
                    cursor.last_error = Some(err.to_string());
                    cursor.updated_at = now.clone();
                    cursors.push(cursor);
                }
                stats.issues.push(IngestIssue {
                    file_path,
                    message: err.to_string(),
                });
                continue;
            }
        };
        let size = metadata.len();
        let inode = inode_from_metadata(&metadata);
        let mtime_ms = metadata
            .modified()
            .ok()
            .map(|time| DateTime::<Utc>::from(time).timestamp_millis());

        let start_offset = match plan_read(cursor.as_ref(), size, mtime_ms, inode) {
            ReadPlan::Skip => {
                stats.files_skipped += 1;
                continue;
            }
            ReadPlan::Resume(offset) => offset,
            ReadPlan::Restart => {
                stats.files_reset += 1;
                tracing::info!(
                    file = %file_path,
                    previous_offset = cursor.as_ref().map(|c| c.byte_offset).unwrap_or(0),
                    size,
                    "log file truncated or replaced, re-reading from start"
                );
                0
            }
        };
        tasks.push(FileTask {
            path: path.to_path_buf(),
            file_path,
            inode,
            mtime_ms,
            size,
            start_offset,
        });
    }

    Ok(ScanPlan {
        tasks,
        cursors,
        stats,
        now,
        started,
    })
}

/// Read-and-commit half of a cycle. Files that vanished or fail to read since
/// the scan are recorded as inactive cursors; the rest are still committed.
pub fn apply_scan(db: &mut Db, plan: ScanPlan) -> Result<IngestStats> {
    let ScanPlan {
        tasks,
        mut cursors,
        mut stats,
        now,
        started: ingest_start,
    } = plan;
    let parsed_files = tasks.into_par_iter().map(parse_file).collect::<Vec<_>>();

    let mut parse_total = StdDuration::ZERO;
    let mut all_events = Vec::new();
    for parsed in parsed_files {
        parse_total += parsed.parse_duration;
        stats.bytes_read += parsed.consumed;
        stats.parse_errors += parsed.parse_errors;
        stats.events_parsed += parsed.events.len();
        if let Some(ref message) = parsed.error {
            stats.files_failed += 1;
            tracing::warn!(file = %parsed.file_path, error = %message, "failed to read log file");
            stats.issues.push(IngestIssue {
                file_path: parsed.file_path.clone(),
                message: message.clone(),
            });
        }
        cursors.push(parsed.cursor(&now));
        all_events.extend(parsed.events);
    }

    let db_start = Instant::now();
    stats.events_inserted = db.commit_ingest(&all_events, &cursors)?;
    let db_total = db_start.elapsed();

    tracing::debug!(
        read_ms = parse_total.as_millis() as u64,
        db_ms = db_total.as_millis() as u64,
        total_ms = ingest_start.elapsed().as_millis() as u64,
        "ingest timing"
    );
    if stats.events_parsed > 0 || stats.files_failed > 0 || stats.files_reset > 0 {
        tracing::info!(
            scanned = stats.files_scanned,
            skipped = stats.files_skipped,
            reset = stats.files_reset,
            failed = stats.files_failed,
            parsed = stats.events_parsed,
            inserted = stats.events_inserted,
            parse_errors = stats.parse_errors,
            "ingest cycle complete"
        );
    }
    Ok(stats)
}

fn inode_from_metadata(metadata: &fs::Metadata) -> Option<u64> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some(metadata.ino())
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        None
    }
}
