use eyre::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::telemetry::COMMAND_INVOCATIONS_SCHEMA;

/// Main labtelemetry configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    pub client: ClientConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

/// Where emitted events are sent
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the server hosting the event log endpoint
    pub base_url: String,
    /// Token sent as `Authorization: token <token>`
    pub token: Option<String>,
    /// Raw `Cookie` header value
    pub cookie: Option<String>,
    /// Extra headers sent with every request
    pub headers: IndexMap<String, String>,
    /// Request timeout in seconds (0 disables it)
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888/".to_string(),
            token: None,
            cookie: None,
            headers: IndexMap::new(),
            timeout_secs: 30,
        }
    }
}

/// Where the event log writes recorded events
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventLogSink {
    /// Append JSON lines under `log_dir`
    File,
    /// Print a one-line summary per event
    Stdout,
}

/// Per-schema recording options
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaOptions {
    pub allowed_categories: Vec<String>,
    pub allowed_properties: Vec<String>,
}

/// Schemas the event log records; anything else is discarded.
/// Accepts either a plain list of schema names or a map of name to options.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AllowedSchemas {
    Names(Vec<String>),
    Options(IndexMap<String, SchemaOptions>),
}

impl AllowedSchemas {
    /// Recording options for `schema`, or `None` if it is not allowed
    pub fn get(&self, schema: &str) -> Option<SchemaOptions> {
        match self {
            AllowedSchemas::Names(names) => names.iter().any(|n| n == schema).then(SchemaOptions::default),
            AllowedSchemas::Options(options) => options.get(schema).cloned(),
        }
    }
}

impl Default for AllowedSchemas {
    fn default() -> Self {
        AllowedSchemas::Options(IndexMap::from([(
            COMMAND_INVOCATIONS_SCHEMA.to_string(),
            SchemaOptions {
                allowed_categories: vec!["action-identifiable-information".to_string()],
                allowed_properties: Vec::new(),
            },
        )]))
    }
}

/// Event log receiver settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: String,
    /// URL prefix the event log endpoint is mounted under
    pub base_url: String,
    /// Token clients must present, if any
    pub token: Option<String>,
    pub sinks: Vec<EventLogSink>,
    /// Directory for the file sink
    pub log_dir: PathBuf,
    /// Extra schema files (JSON or YAML) to register at startup
    pub schema_files: Vec<PathBuf>,
    pub allowed_schemas: AllowedSchemas,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8888".to_string(),
            base_url: "/".to_string(),
            token: None,
            sinks: vec![EventLogSink::File],
            log_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("labtelemetry")
                .join("events"),
            schema_files: Vec::new(),
            allowed_schemas: AllowedSchemas::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Ok(env_path) = std::env::var("LABTELEMETRY_CONFIG") {
            let path = PathBuf::from(env_path);
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from LABTELEMETRY_CONFIG: {}", e);
                    }
                }
            }
        }

        // LABTELEMETRY_DIR/labtelemetry.yaml, then ~/.config/labtelemetry/labtelemetry.yaml
        let path = Self::config_dir().join("labtelemetry.yaml");
        if path.exists() {
            match Self::load_from_file(&path) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }

        // Try ./labtelemetry.yaml (for development)
        let local_config = PathBuf::from("labtelemetry.yaml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load local config: {}", e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.server.log_dir = Self::expand_path(&config.server.log_dir);
        config.server.schema_files = config.server.schema_files.iter().map(|p| Self::expand_path(p)).collect();

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Directory holding labtelemetry.yaml
    pub fn config_dir() -> PathBuf {
        std::env::var("LABTELEMETRY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("labtelemetry"))
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.client.base_url, "http://localhost:8888/");
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.server.sinks, vec![EventLogSink::File]);
        assert!(config.server.allowed_schemas.get(COMMAND_INVOCATIONS_SCHEMA).is_some());
    }

    #[test]
    fn test_allowed_schemas_from_list() {
        let allowed: AllowedSchemas = serde_yaml::from_str("- test.event\n- other.event\n").unwrap();

        assert_eq!(allowed.get("test.event"), Some(SchemaOptions::default()));
        assert!(allowed.get("missing.event").is_none());
    }

    #[test]
    fn test_allowed_schemas_from_map() {
        let yaml = r#"
test.event:
  allowed_categories: [user-identifier]
  allowed_properties: [email]
"#;
        let allowed: AllowedSchemas = serde_yaml::from_str(yaml).unwrap();

        let options = allowed.get("test.event").unwrap();
        assert_eq!(options.allowed_categories, vec!["user-identifier"]);
        assert_eq!(options.allowed_properties, vec!["email"]);
    }

    #[test]
    fn test_allowed_schemas_rejects_unknown_option() {
        let yaml = "test.event:\n  allowed_colors: [red]\n";
        assert!(serde_yaml::from_str::<AllowedSchemas>(yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labtelemetry.yaml");
        fs::write(
            &path,
            r#"
log_level: debug
client:
  base_url: http://hub.example/user/alice/
  token: abc
  headers:
    X-Team: data
server:
  bind: 0.0.0.0:9999
  sinks: [stdout]
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.client.base_url, "http://hub.example/user/alice/");
        assert_eq!(config.client.token.as_deref(), Some("abc"));
        assert_eq!(config.client.headers.get("X-Team").map(String::as_str), Some("data"));
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.server.bind, "0.0.0.0:9999");
        assert_eq!(config.server.sinks, vec![EventLogSink::Stdout]);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/labtelemetry.yaml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_expand_path_no_expansion() {
        let path = PathBuf::from("/usr/local/share");
        assert_eq!(Config::expand_path(&path), PathBuf::from("/usr/local/share"));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = Config::expand_path(&PathBuf::from("~/events"));
        assert!(!expanded.to_string_lossy().contains('~'));
        assert!(expanded.to_string_lossy().contains("events"));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let yaml_str = serde_yaml::to_string(&config).expect("Failed to serialize");
        let parsed: Config = serde_yaml::from_str(&yaml_str).expect("Failed to deserialize");
        assert_eq!(parsed.client.base_url, config.client.base_url);
        assert_eq!(parsed.server.allowed_schemas, config.server.allowed_schemas);
    }
}
