//! Recording received events as timestamped capsules

use chrono::{DateTime, Local, Utc};
use colored::*;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::schema::SchemaRegistry;
use crate::config::{AllowedSchemas, EventLogSink, ServerConfig};

/// Version of the `__`-prefixed capsule metadata layout
pub const METADATA_VERSION: u64 = 1;

/// Category every property may be recorded under regardless of configuration
const UNRESTRICTED: &str = "unrestricted";

/// A recorded event: capsule metadata followed by the filtered properties
pub type Capsule = Map<String, Value>;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Schema {schema} version {version} not registered")]
    NotRegistered { schema: String, version: u64 },

    #[error("Event does not match schema {schema}: {reason}")]
    Invalid { schema: String, reason: String },
}

/// Sends structured events to the configured sinks
pub struct EventLog {
    registry: SchemaRegistry,
    allowed_schemas: AllowedSchemas,
    sinks: Vec<EventLogSink>,
    log_dir: PathBuf,
}

impl EventLog {
    pub fn new(registry: SchemaRegistry, config: &ServerConfig) -> Self {
        Self {
            registry,
            allowed_schemas: config.allowed_schemas.clone(),
            sinks: config.sinks.clone(),
            log_dir: config.log_dir.clone(),
        }
    }

    /// Record an event stamped with the current time
    ///
    /// Returns the capsule that was written, or `None` when the schema is
    /// not allowed or there is nowhere to write it.
    pub fn record_event(&self, schema: &str, version: u64, event: &Value) -> Result<Option<Capsule>, RecordError> {
        self.record_event_at(schema, version, event, Utc::now())
    }

    pub fn record_event_at(
        &self,
        schema_name: &str,
        version: u64,
        event: &Value,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Capsule>, RecordError> {
        let options = match self.allowed_schemas.get(schema_name) {
            Some(options) if !self.sinks.is_empty() => options,
            _ => {
                log::debug!("Discarding event for schema {} (not recorded)", schema_name);
                return Ok(None);
            }
        };

        let schema = self
            .registry
            .get(schema_name, version)
            .ok_or_else(|| RecordError::NotRegistered {
                schema: schema_name.to_string(),
                version,
            })?;

        let invalid = |reason: String| RecordError::Invalid {
            schema: schema_name.to_string(),
            reason,
        };

        let fields = event
            .as_object()
            .ok_or_else(|| invalid("event must be an object".to_string()))?;
        if let Some(reason) = schema.validator.first_error(event) {
            return Err(invalid(reason));
        }

        let mut capsule = Capsule::new();
        capsule.insert(
            "__timestamp__".to_string(),
            Value::String(timestamp.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()),
        );
        capsule.insert("__schema__".to_string(), Value::String(schema_name.to_string()));
        capsule.insert("__schema_version__".to_string(), Value::from(version));
        capsule.insert("__metadata_version__".to_string(), Value::from(METADATA_VERSION));

        let allowed_properties: HashSet<&str> = options.allowed_properties.iter().map(String::as_str).collect();
        let mut allowed_categories: HashSet<&str> = options.allowed_categories.iter().map(String::as_str).collect();
        allowed_categories.insert(UNRESTRICTED);

        for (name, data) in fields {
            let spec = schema
                .properties
                .get(name)
                .ok_or_else(|| invalid(format!("{} is not a declared property", name)))?;

            let recorded = allowed_properties.contains(name.as_str())
                || spec.categories.iter().any(|c| allowed_categories.contains(c.as_str()));
            capsule.insert(name.clone(), if recorded { data.clone() } else { Value::Null });
        }

        for sink in &self.sinks {
            match sink {
                EventLogSink::File => {
                    if let Err(e) = self.write_to_file(&capsule, timestamp) {
                        log::warn!("Failed to write event to file sink: {}", e);
                    }
                }
                EventLogSink::Stdout => println!("{}", format_display(&capsule)),
            }
        }

        Ok(Some(capsule))
    }

    /// JSONL file an event stamped at `timestamp` is appended to
    pub fn log_file(&self, timestamp: DateTime<Utc>) -> PathBuf {
        day_file(&self.log_dir, timestamp)
    }

    fn write_to_file(&self, capsule: &Capsule, timestamp: DateTime<Utc>) -> std::io::Result<()> {
        let log_file = self.log_file(timestamp);
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(capsule)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(log_file)?;
        file.write_all(line.as_bytes())?;

        Ok(())
    }
}

/// `<dir>/<YYYY-MM>/<YYYY-MM-DD>.jsonl` for the UTC day of `timestamp`
pub fn day_file(dir: &Path, timestamp: DateTime<Utc>) -> PathBuf {
    dir.join(timestamp.format("%Y-%m").to_string())
        .join(format!("{}.jsonl", timestamp.format("%Y-%m-%d")))
}

/// One-line terminal summary of a capsule
pub fn format_display(capsule: &Capsule) -> String {
    let local_time = capsule
        .get("__timestamp__")
        .and_then(|t| t.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let schema = capsule.get("__schema__").and_then(|s| s.as_str()).unwrap_or("?");

    let mut parts = vec![local_time.dimmed().to_string(), schema.cyan().to_string()];

    if let Some(session) = capsule.get("session_id").and_then(|s| s.as_str()) {
        let short: String = session.chars().take(8).collect();
        parts.push(format!("[{}]", short).dimmed().to_string());
    }

    if let Some(command) = capsule.get("command_id").and_then(|c| c.as_str()) {
        parts.push(command.bold().to_string());
    }

    parts.join(" ")
}
