use std::env;
use std::path::PathBuf;

use tokenboard_db::Bucket;

const DEFAULT_HISTORY_COUNT: usize = 24;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run,
    Ingest { rescan: bool },
    Status { json: bool },
    History { bucket: Bucket, count: usize, json: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub command: Command,
    pub config_path: Option<PathBuf>,
    /// Evaluation instant for `status` and `history`; defaults to now.
    pub at: Option<String>,
}

pub fn parse_args() -> Result<CliArgs, String> {
    parse_from(env::args().skip(1))
}

pub fn parse_from(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut command: Option<String> = None;
    let mut config_path = None;
    let mut at = None;
    let mut rescan = false;
    let mut json = false;
    let mut bucket = None;
    let mut count = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --config".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--at" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --at".to_string())?;
                at = Some(value);
            }
            "--rescan" => rescan = true,
            "--json" => json = true,
            "--bucket" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --bucket".to_string())?;
                bucket = Some(value.parse::<Bucket>()?);
            }
            "--count" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --count".to_string())?;
                let parsed = value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid count value: {value}"))?;
                count = Some(parsed);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            value if !value.starts_with('-') && command.is_none() => {
                command = Some(value.to_string());
            }
            _ => {
                return Err(format!("unknown argument: {arg}"));
            }
        }
    }

    let command = match command.as_deref().unwrap_or("run") {
        "run" => Command::Run,
        "ingest" => Command::Ingest { rescan },
        "status" => Command::Status { json },
        "history" => Command::History {
            bucket: bucket.unwrap_or(Bucket::Hour),
            count: count.unwrap_or(DEFAULT_HISTORY_COUNT),
            json,
        },
        other => return Err(format!("unknown command: {other}")),
    };

    Ok(CliArgs {
        command,
        config_path,
        at,
    })
}

pub fn print_help() {
    println!(
        "TokenBoard CLI\n\n\
Usage:\n  tokenboard [run]\n  tokenboard ingest [--rescan]\n  tokenboard status [--json]\n  tokenboard history [--bucket hour|day] [--count <n>] [--json]\n\n\
Options:\n  --config <path>  Use this config file instead of the default location\n  --at <rfc3339>   Evaluate status and history at this instant\n  --rescan         Forget file cursors and re-read every log\n  --json           Print machine-readable output\n  -h, --help       Show this help message\n"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, String> {
        parse_from(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn defaults_to_run() {
        let args = parse(&[]).expect("parse");
        assert_eq!(args.command, Command::Run);
        assert!(args.config_path.is_none());
    }

    #[test]
    fn parses_history_with_flags_in_any_order() {
        let args = parse(&["--count", "48", "history", "--bucket", "day", "--json"]).expect("parse");
        assert_eq!(
            args.command,
            Command::History {
                bucket: Bucket::Day,
                count: 48,
                json: true
            }
        );
    }

    #[test]
    fn parses_global_options() {
        let args = parse(&[
            "status",
            "--config",
            "/tmp/tb.toml",
            "--at",
            "2025-01-01T00:00:00Z",
        ])
        .expect("parse");
        assert_eq!(args.command, Command::Status { json: false });
        assert_eq!(args.config_path, Some(PathBuf::from("/tmp/tb.toml")));
        assert_eq!(args.at.as_deref(), Some("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["launch"]).is_err());
        assert!(parse(&["history", "--bucket", "week"]).is_err());
        assert!(parse(&["history", "--count", "many"]).is_err());
        assert!(parse(&["ingest", "--force"]).is_err());
        assert!(parse(&["status", "extra"]).is_err());
    }
}
