use std::env;
use std::fs::File;
use std::io::{self, Cursor, Read};

use ingest::usage_events_from_reader;
use tokenboard_core::UsageTotals;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: ingest_cli <path|->");
        std::process::exit(2);
    }

    let path = &args[1];
    let mut data = String::new();
    if path == "-" {
        let mut stdin = io::stdin();
        stdin.read_to_string(&mut data).unwrap_or_else(|err| {
            eprintln!("failed to read stdin: {}", err);
            std::process::exit(1);
        });
    } else {
        let mut file = File::open(path).unwrap_or_else(|err| {
            eprintln!("failed to open {}: {}", path, err);
            std::process::exit(1);
        });
        file.read_to_string(&mut data).unwrap_or_else(|err| {
            eprintln!("failed to read {}: {}", path, err);
            std::process::exit(1);
        });
    }

    let source = if path == "-" { "stdin.jsonl" } else { path.as_str() };
    let events = usage_events_from_reader(Cursor::new(&data), source);
    if events.is_empty() {
        eprintln!("no assistant usage records found");
        std::process::exit(3);
    }

    let totals = events
        .iter()
        .fold(UsageTotals::default(), |acc, event| acc.add(event.usage));
    println!("messages {}", events.len());
    println!("total_tokens {}", totals.total_tokens);
    println!("input_tokens {}", totals.input_tokens);
    println!("output_tokens {}", totals.output_tokens);
    println!("cache_creation_tokens {}", totals.cache_creation_tokens);
    println!("cache_read_tokens {}", totals.cache_read_tokens);
    if let (Some(first), Some(last)) = (events.first(), events.last()) {
        println!("first_ts {}", first.ts);
        println!("last_ts {}", last.ts);
    }
}
