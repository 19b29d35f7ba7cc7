use colored::*;
use eyre::{Context, Result};
use std::path::Path;

use super::serve::load_registry;
use crate::cli::{OutputFormat, SchemaAction};
use crate::config::Config;
use crate::eventlog::SchemaRegistry;

pub fn run(action: SchemaAction, config: &Config) -> Result<()> {
    match action {
        SchemaAction::List { format } => list(OutputFormat::resolve(format), config),
        SchemaAction::Check { path } => check(&path),
    }
}

fn list(format: OutputFormat, config: &Config) -> Result<()> {
    let registry = load_registry(config)?;
    let schemas: Vec<_> = registry.iter().collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&schemas)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(&schemas)?);
        }
        OutputFormat::Text => {
            for schema in schemas {
                let allowed = config.server.allowed_schemas.get(&schema.id);
                let status = if allowed.is_some() { "recorded".green() } else { "ignored".dimmed() };
                println!("{} v{} ({})", schema.id.bold(), schema.version, status);

                for (name, spec) in &schema.properties {
                    println!("  {}: {}", name.cyan(), spec.categories.join(", "));
                }
            }
        }
    }

    Ok(())
}

fn check(path: &Path) -> Result<()> {
    // Check against the built-in schema so a clash with it is reported too
    let mut registry = SchemaRegistry::with_builtin().context("Failed to register built-in schema")?;

    let schema = registry
        .register_file(path)
        .context(format!("Invalid schema file {}", path.display()))?;

    println!(
        "{} {} v{} ({} properties)",
        "✓".green(),
        schema.id.bold(),
        schema.version,
        schema.properties.len()
    );
    Ok(())
}
