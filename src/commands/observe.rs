//! Live event observation command
//!
//! Tails the event log written by `serve`, similar to `tail -f`.

use chrono::Utc;
use colored::*;
use eyre::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::eventlog::recorder::{Capsule, day_file, format_display};

/// Run the observe command
pub fn run(filter: Option<&str>, last: usize, include_payload: bool, config: &Config) -> Result<()> {
    let events_dir = &config.server.log_dir;

    println!("{} Observing events in {} (Ctrl+C to stop)...", "👁".blue(), events_dir.display());
    if let Some(f) = filter {
        println!("  Filter: {}", f.cyan());
    }
    println!();

    if last > 0 {
        show_recent_events(events_dir, last, filter, include_payload)?;
        println!("{}", "--- Live tail ---".dimmed());
        println!();
    }

    tail_events(events_dir, filter, include_payload)
}

/// Whether a capsule's schema or command id contains `filter`
fn matches_filter(capsule: &Capsule, filter: Option<&str>) -> bool {
    let Some(f) = filter else {
        return true;
    };
    let f = f.to_lowercase();

    ["__schema__", "command_id"]
        .iter()
        .filter_map(|key| capsule.get(*key).and_then(|v| v.as_str()))
        .any(|v| v.to_lowercase().contains(&f))
}

fn parse_line(line: &str) -> Option<Capsule> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Show the last N events from yesterday's and today's files
fn show_recent_events(events_dir: &Path, count: usize, filter: Option<&str>, include_payload: bool) -> Result<()> {
    let mut all_events = Vec::new();

    let today = Utc::now();
    let yesterday = today - chrono::Duration::days(1);

    for date in [yesterday, today] {
        let log_file = day_file(events_dir, date);

        if log_file.exists()
            && let Ok(content) = fs::read_to_string(&log_file)
        {
            all_events.extend(
                content
                    .lines()
                    .filter_map(parse_line)
                    .filter(|capsule| matches_filter(capsule, filter)),
            );
        }
    }

    let start = all_events.len().saturating_sub(count);
    for capsule in &all_events[start..] {
        print_event(capsule, include_payload);
    }

    Ok(())
}

/// Tail the current day's log file
fn tail_events(events_dir: &Path, filter: Option<&str>, include_payload: bool) -> Result<()> {
    loop {
        let today = Utc::now();
        let log_file = day_file(events_dir, today);

        if !log_file.exists() {
            // Wait for the server to write the first event of the day
            thread::sleep(Duration::from_secs(1));
            continue;
        }

        let file = File::open(&log_file).context("Failed to open log file")?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::End(0))?;

        let mut line = String::new();
        loop {
            match reader.read_line(&mut line) {
                Ok(0) => {
                    thread::sleep(Duration::from_millis(100));

                    // New day, switch to new file
                    if Utc::now().format("%Y-%m-%d").to_string() != today.format("%Y-%m-%d").to_string() {
                        break;
                    }
                }
                Ok(_) => {
                    if let Some(complete) = take_line(&mut line)
                        && let Some(capsule) = parse_line(&complete)
                        && matches_filter(&capsule, filter)
                    {
                        print_event(&capsule, include_payload);
                    }
                }
                Err(e) => {
                    log::warn!("Error reading log file: {}", e);
                    thread::sleep(Duration::from_secs(1));
                }
            }
        }
    }
}

/// Take the buffered line once the writer has finished it
///
/// A read can stop partway through a line the server is still appending;
/// the partial text stays buffered until its newline arrives.
fn take_line(buffer: &mut String) -> Option<String> {
    if buffer.ends_with('\n') {
        Some(std::mem::take(buffer))
    } else {
        None
    }
}

/// Print a single capsule, optionally followed by its recorded properties
fn print_event(capsule: &Capsule, include_payload: bool) {
    println!("{}", format_display(capsule));

    if include_payload {
        let properties: Capsule = capsule
            .iter()
            .filter(|(k, _)| !k.starts_with("__"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let pretty = serde_json::to_string_pretty(&properties).unwrap_or_default();
        for line in pretty.lines() {
            println!("  {}", line.dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::path::PathBuf;

    fn capsule(value: serde_json::Value) -> Capsule {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_day_file_layout() {
        let date = Utc.with_ymd_and_hms(2026, 1, 3, 12, 0, 0).unwrap();
        assert_eq!(
            day_file(Path::new("/var/events"), date),
            PathBuf::from("/var/events/2026-01/2026-01-03.jsonl")
        );
    }

    #[test]
    fn test_matches_filter() {
        let c = capsule(json!({"__schema__": "lab.jupyter.org/command-invocations", "command_id": "notebook:run-cell"}));

        assert!(matches_filter(&c, None));
        assert!(matches_filter(&c, Some("RUN-CELL")));
        assert!(matches_filter(&c, Some("command-invocations")));
        assert!(!matches_filter(&c, Some("docmanager")));
    }

    #[test]
    fn test_parse_line_skips_garbage() {
        assert!(parse_line("   ").is_none());
        assert!(parse_line("not json").is_none());
        assert!(parse_line(r#"{"__schema__": "x"}"#).is_some());
    }

    #[test]
    fn test_take_line_waits_for_newline() {
        let mut buffer = r#"{"__schema__": "x", "command_id""#.to_string();

        assert!(take_line(&mut buffer).is_none());
        assert!(buffer.starts_with("{"));

        buffer.push_str(": \"notebook:run-cell\"}\n");
        let line = take_line(&mut buffer).unwrap();

        assert!(buffer.is_empty());
        assert_eq!(parse_line(&line).unwrap()["command_id"], "notebook:run-cell");
    }
}
