use std::collections::BTreeMap;
use std::str::FromStr;

use tokenboard_core::UsageTotals;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Hour,
    Day,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    /// Prefix length of a stored RFC3339 timestamp that identifies the bucket.
    pub(crate) fn key_len(&self) -> i64 {
        match self {
            Self::Hour => 13,
            Self::Day => 10,
        }
    }

    pub(crate) fn start_from_key(&self, key: &str) -> String {
        match self {
            Self::Hour => format!("{}:00:00.000Z", key),
            Self::Day => format!("{}T00:00:00.000Z", key),
        }
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hour" | "hourly" => Ok(Self::Hour),
            "day" | "daily" => Ok(Self::Day),
            other => Err(format!("unknown bucket {}", other)),
        }
    }
}

/// Read position and last observed identity of one log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCursor {
    pub file_path: String,
    pub inode: Option<u64>,
    pub mtime_ms: Option<i64>,
    pub file_size: u64,
    pub byte_offset: u64,
    pub active: bool,
    pub last_error: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowTotals {
    pub totals: UsageTotals,
    pub message_count: u64,
    pub by_model: BTreeMap<String, UsageTotals>,
}
