use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl OutputFormat {
    /// Resolve the effective output format.
    /// If user specified a format, use it.
    /// Otherwise: TTY → Text, non-TTY (pipe) → Json
    pub fn resolve(user_choice: Option<OutputFormat>) -> OutputFormat {
        match user_choice {
            Some(fmt) => fmt,
            None => {
                if std::io::stdout().is_terminal() {
                    OutputFormat::Text
                } else {
                    OutputFormat::Json
                }
            }
        }
    }
}

#[derive(Parser)]
#[command(
    name = "labtelemetry",
    about = "Emit command-invocation telemetry and receive it on an event log server",
    version,
    after_help = "Logs are written to: ~/.local/share/labtelemetry/logs/labtelemetry.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to labtelemetry.yaml config file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Emit a single command-invocation event
    Emit {
        /// Id of the executed command (e.g. notebook:run-cell)
        command_id: String,

        /// Command arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Session id (a random one is generated if omitted)
        #[arg(long)]
        session: Option<String>,

        /// Override the configured server base URL
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Emit one event per JSON line read from stdin
    Track {
        /// Session id shared by every event (a random one is generated if omitted)
        #[arg(long)]
        session: Option<String>,

        /// Override the configured server base URL
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Run the event log server
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Watch events recorded by the event log server
    Observe {
        /// Only show events whose schema or command id contains this text
        #[arg(long)]
        filter: Option<String>,

        /// Show the last N recorded events before tailing
        #[arg(long, default_value = "10")]
        last: usize,

        /// Print recorded properties under each event
        #[arg(long)]
        payload: bool,
    },

    /// Print a fresh session id
    Session,

    /// Inspect event schemas
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum SchemaAction {
    /// List registered schemas
    List {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Validate a schema file without registering it
    Check {
        /// Schema file (JSON or YAML)
        path: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Get a configuration value
    Get {
        /// Configuration key (dot notation)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,

        /// New value
        value: String,
    },
}
