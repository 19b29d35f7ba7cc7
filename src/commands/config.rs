use colored::*;
use eyre::{Context, Result};
use std::fs;
use std::path::Path;

use crate::cli::{ConfigAction, OutputFormat};
use crate::config::{Config, LogLevel};

pub fn run(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
        ConfigAction::Get { key } => get(&key, config),
        ConfigAction::Set { key, value } => set(&key, &value, config),
    }
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        OutputFormat::Text => {
            println!("{}", "labtelemetry Configuration".bold());
            println!();

            println!("log_level: {}", config.log_level.as_filter());
            println!();

            println!("{}:", "client".cyan());
            println!("  base_url: {}", config.client.base_url);
            println!("  token: {}", if config.client.token.is_some() { "(set)" } else { "(none)" });
            println!("  timeout_secs: {}", config.client.timeout_secs);
            println!();

            println!("{}:", "server".cyan());
            println!("  bind: {}", config.server.bind);
            println!("  base_url: {}", config.server.base_url);
            println!("  log_dir: {}", config.server.log_dir.display());
        }
    }

    Ok(())
}

/// Look up a dot-notation key
fn lookup(key: &str, config: &Config) -> Option<String> {
    match key {
        "log_level" | "log-level" => Some(config.log_level.as_filter().to_string()),
        "client.base_url" => Some(config.client.base_url.clone()),
        "client.timeout_secs" => Some(config.client.timeout_secs.to_string()),
        "server.bind" => Some(config.server.bind.clone()),
        "server.base_url" => Some(config.server.base_url.clone()),
        "server.log_dir" => Some(config.server.log_dir.display().to_string()),
        _ => None,
    }
}

fn get(key: &str, config: &Config) -> Result<()> {
    match lookup(key, config) {
        Some(v) => println!("{}", v),
        None => {
            eprintln!("{} Unknown config key: {}", "✗".red(), key);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Apply `key = value` to a copy of `config`
fn apply(key: &str, value: &str, config: &Config) -> Result<Config> {
    let mut new_config = config.clone();

    match key {
        "log_level" | "log-level" => {
            new_config.log_level =
                serde_yaml::from_str::<LogLevel>(value).context("Invalid log level (trace, debug, info, warn, error, off)")?;
        }
        "client.base_url" => new_config.client.base_url = value.to_string(),
        "client.token" => new_config.client.token = Some(value.to_string()),
        "client.timeout_secs" => {
            new_config.client.timeout_secs = value.parse().context("Invalid number of seconds")?;
        }
        "server.bind" => new_config.server.bind = value.to_string(),
        "server.base_url" => new_config.server.base_url = value.to_string(),
        "server.token" => new_config.server.token = Some(value.to_string()),
        "server.log_dir" => new_config.server.log_dir = Config::expand_path(Path::new(value)),
        _ => {
            eyre::bail!("Unknown config key: {}", key);
        }
    }

    Ok(new_config)
}

fn set(key: &str, value: &str, config: &Config) -> Result<()> {
    println!("{} Setting {} = {}", "→".blue(), key.cyan(), value.green());

    let new_config = apply(key, value, config)?;

    let config_path = Config::config_dir().join("labtelemetry.yaml");
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let yaml_str = serde_yaml::to_string(&new_config).context("Failed to serialize config")?;
    fs::write(&config_path, yaml_str).context("Failed to write config file")?;

    println!("  {} Saved to {}", "✓".green(), config_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_keys() {
        let config = Config::default();
        assert_eq!(lookup("client.base_url", &config).as_deref(), Some("http://localhost:8888/"));
        assert_eq!(lookup("log-level", &config).as_deref(), Some("info"));
        assert!(lookup("client.nope", &config).is_none());
    }

    #[test]
    fn test_apply_updates_copy() {
        let config = Config::default();

        let updated = apply("client.base_url", "http://hub.test/", &config).unwrap();

        assert_eq!(updated.client.base_url, "http://hub.test/");
        assert_eq!(config.client.base_url, "http://localhost:8888/");
    }

    #[test]
    fn test_apply_log_level() {
        let updated = apply("log_level", "debug", &Config::default()).unwrap();
        assert_eq!(updated.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let config = Config::default();
        assert!(apply("client.timeout_secs", "soon", &config).is_err());
        assert!(apply("log_level", "loud", &config).is_err());
        assert!(apply("unknown.key", "x", &config).is_err());
    }
}
