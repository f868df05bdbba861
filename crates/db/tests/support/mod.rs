#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use tokenboard_core::{TimeRange, UsageEvent, UsageTotals, session_id_from_source};
use tokenboard_db::{Db, FileCursor};

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn insert_events(db: &mut Db, events: Vec<UsageEvent>) -> usize {
    db.insert_usage_events(&events).expect("insert events")
}

pub fn make_event(id: &str, ts: &str, model: &str, usage: UsageTotals, source: &str) -> UsageEvent {
    UsageEvent {
        id: id.to_string(),
        ts: ts.to_string(),
        session_id: session_id_from_source(source),
        model: model.to_string(),
        usage,
        source: source.to_string(),
    }
}

pub fn tokens(total: u64) -> UsageTotals {
    UsageTotals::from_parts(total, 0, 0, 0)
}

pub fn range(start: &str, end: &str) -> TimeRange {
    TimeRange {
        start: start.to_string(),
        end: end.to_string(),
    }
}

pub fn make_cursor(file_path: &str, byte_offset: u64) -> FileCursor {
    FileCursor {
        file_path: file_path.to_string(),
        inode: Some(42),
        mtime_ms: Some(1_700_000_000_000),
        file_size: byte_offset,
        byte_offset,
        active: true,
        last_error: None,
        updated_at: "2025-01-01T00:00:00.000Z".to_string(),
    }
}
