use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokenboard_core::{UsageEvent, UsageTotals, session_id_from_source};

const UNKNOWN_MODEL: &str = "unknown";
/// Upper bound for a single counter; larger values are treated as corrupt so
/// stored sums stay within SQLite's signed 64-bit range.
const MAX_TOKENS_PER_FIELD: u64 = 1_000_000_000_000;

/// Result of parsing one complete log line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Event(UsageEvent),
    /// Well-formed, but not a usage record (user turns, summaries, blank lines).
    Ignored,
    Invalid(String),
}

fn find_string<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    for path in paths {
        let mut current = value;
        let mut ok = true;
        for key in *path {
            if let Some(next) = current.get(*key) {
                current = next;
            } else {
                ok = false;
                break;
            }
        }
        if ok && let Some(found) = current.as_str() {
            return Some(found);
        }
    }
    None
}

fn normalize_timestamp(raw: &str) -> Option<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(
            parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        let dt = DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc);
        return Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    None
}

/// Missing counters are zero; present but non-integral or oversized
/// counters are invalid.
fn token_field(usage: &Value, key: &str) -> Result<u64, String> {
    match usage.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => {
            let count = value
                .as_u64()
                .ok_or_else(|| format!("{} is not a non-negative integer", key))?;
            if count > MAX_TOKENS_PER_FIELD {
                return Err(format!("{} of {} exceeds {}", key, count, MAX_TOKENS_PER_FIELD));
            }
            Ok(count)
        }
    }
}

fn parse_usage(usage: &Value) -> Result<UsageTotals, String> {
    if !usage.is_object() {
        return Err("usage is not an object".to_string());
    }
    Ok(UsageTotals::from_parts(
        token_field(usage, "input_tokens")?,
        token_field(usage, "output_tokens")?,
        token_field(usage, "cache_creation_input_tokens")?,
        token_field(usage, "cache_read_input_tokens")?,
    ))
}

pub(crate) fn parse_json_line(line: &str) -> Option<Value> {
    serde_json::from_str(line).ok()
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{:02x}", byte);
    }
    out
}

/// Dedup key: identical content at the same path always hashes the same.
pub fn hash_line(source: &str, line: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b":");
    hasher.update(line.as_bytes());
    hex_digest(&hasher.finalize())
}

pub fn parse_usage_line(line: &str, source: &str, fallback_session: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Ignored;
    }
    let Some(obj) = parse_json_line(line) else {
        return LineOutcome::Invalid("malformed json".to_string());
    };
    if !obj.is_object() {
        return LineOutcome::Invalid("record is not an object".to_string());
    }
    if obj.get("type").and_then(Value::as_str) != Some("assistant") {
        return LineOutcome::Ignored;
    }
    let Some(message) = obj.get("message") else {
        return LineOutcome::Ignored;
    };
    let usage = match message.get("usage") {
        None | Some(Value::Null) => return LineOutcome::Ignored,
        Some(Value::Object(fields)) if fields.is_empty() => return LineOutcome::Ignored,
        Some(usage) => match parse_usage(usage) {
            Ok(usage) => usage,
            Err(err) => return LineOutcome::Invalid(err),
        },
    };
    let Some(raw_ts) = find_string(&obj, &[&["timestamp"]]) else {
        return LineOutcome::Invalid("missing timestamp".to_string());
    };
    let Some(ts) = normalize_timestamp(raw_ts) else {
        return LineOutcome::Invalid(format!("unparseable timestamp {}", raw_ts));
    };
    let session_id = find_string(&obj, &[&["sessionId"], &["session_id"]])
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback_session)
        .to_string();
    let model = find_string(message, &[&["model"]])
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_MODEL)
        .to_string();

    LineOutcome::Event(UsageEvent {
        id: hash_line(source, line),
        ts,
        session_id,
        model,
        usage,
        source: source.to_string(),
    })
}

pub fn usage_events_from_reader<R: std::io::BufRead>(reader: R, source: &str) -> Vec<UsageEvent> {
    let session_id = session_id_from_source(source);
    reader
        .lines()
        .map_while(|line| line.ok())
        .filter_map(|line| match parse_usage_line(&line, source, &session_id) {
            LineOutcome::Event(event) => Some(event),
            LineOutcome::Ignored | LineOutcome::Invalid(_) => None,
        })
        .collect()
}
