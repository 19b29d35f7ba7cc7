use colored::*;
use eyre::{Context, Result};
use serde_json::{Map, Value};

use crate::config::Config;
use crate::telemetry::{CommandInvocation, ServerSettings, SessionId, TelemetryHandler};

/// Run the emit command
pub fn run(
    command_id: &str,
    args: Option<&str>,
    session: Option<String>,
    base_url: Option<String>,
    config: &Config,
) -> Result<()> {
    let command_args = parse_args(args)?;
    let session_id = session.map(SessionId::from).unwrap_or_else(SessionId::generate);
    let handler = TelemetryHandler::new(client_settings(config, base_url));

    let invocation = CommandInvocation::new(session_id.as_str(), command_id, command_args);

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(handler.emit(invocation))
        .context(format!("Failed to deliver event to {}", handler.settings().eventlog_url()))?;

    println!(
        "{} Delivered {} [{}]",
        "✓".green(),
        command_id.bold(),
        session_id.to_string().dimmed()
    );
    Ok(())
}

/// Client settings from config, with an optional base URL override
pub fn client_settings(config: &Config, base_url: Option<String>) -> ServerSettings {
    let mut client = config.client.clone();
    if let Some(url) = base_url {
        client.base_url = url;
    }
    ServerSettings::from(&client)
}

/// Parse `--args`; absent means no arguments
pub fn parse_args(args: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = args else {
        return Ok(Map::new());
    };

    match serde_json::from_str(raw).context("Failed to parse --args as JSON")? {
        Value::Object(map) => Ok(map),
        other => eyre::bail!("--args must be a JSON object, got: {}", other),
    }
}
