//! Stream command notifications from a host process
//!
//! Reads one JSON object per line from stdin, e.g.
//! `{"command_id": "notebook:run-cell", "command_args": {"cellIndex": 3}}`,
//! and emits each as a command invocation. Emits run in the background;
//! reading never waits on delivery.

use colored::*;
use eyre::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io::{self, BufRead};
use tokio::task::JoinHandle;

use super::emit::client_settings;
use crate::config::Config;
use crate::telemetry::{CommandTracker, SessionId, TelemetryHandler};

/// One "command executed" notification
#[derive(Debug, Deserialize)]
struct Notification {
    command_id: String,
    #[serde(default)]
    command_args: Map<String, Value>,
}

fn parse_notification(line: &str) -> Result<Notification> {
    serde_json::from_str(line).context("Invalid command notification")
}

/// Drop handles of deliveries that already finished
fn prune_finished(pending: &mut Vec<JoinHandle<()>>) {
    pending.retain(|handle| !handle.is_finished());
}

/// Run the track command
pub fn run(session: Option<String>, base_url: Option<String>, config: &Config) -> Result<()> {
    let session_id = session.map(SessionId::from).unwrap_or_else(SessionId::generate);
    let tracker = CommandTracker::new(session_id, TelemetryHandler::new(client_settings(config, base_url)));

    eprintln!(
        "{} Tracking commands for session {} (Ctrl+D to stop)",
        "→".blue(),
        tracker.session_id().to_string().cyan()
    );

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let guard = rt.enter();

    let mut pending = Vec::new();
    let mut dispatched = 0usize;
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        match parse_notification(&line) {
            Ok(notification) => {
                if let Some(handle) = tracker.command_executed(&notification.command_id, &notification.command_args) {
                    dispatched += 1;
                    prune_finished(&mut pending);
                    pending.push(handle);
                }
            }
            Err(e) => {
                eprintln!("{} Skipping line: {:#}", "✗".red(), e);
            }
        }
    }

    drop(guard);

    rt.block_on(async {
        for handle in pending {
            if let Err(e) = handle.await {
                log::warn!("Telemetry task failed: {}", e);
            }
        }
    });

    eprintln!("{} Dispatched {} events", "✓".green(), dispatched);
    Ok(())
}
