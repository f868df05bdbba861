mod parser;
mod paths;
mod pipeline;
mod types;

pub use parser::{LineOutcome, hash_line, parse_usage_line, usage_events_from_reader};
pub use paths::default_log_root;
pub use pipeline::{ReadPlan, ScanPlan, apply_scan, ingest_log_root, plan_read, scan_log_root};
pub use types::{IngestError, IngestIssue, IngestStats, Result};
