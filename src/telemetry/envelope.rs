//! Command-invocation events and the schema envelope they travel in

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema id every command-invocation envelope is tagged with
pub const COMMAND_INVOCATIONS_SCHEMA: &str = "lab.jupyter.org/command-invocations";

/// Wire format version of the command-invocation envelope.
/// Bump this whenever the envelope or event shape changes.
pub const COMMAND_INVOCATIONS_VERSION: u64 = 1;

/// A record of one executed command in the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInvocation {
    /// Id of the session the command ran in
    pub session_id: String,
    /// Id of the command
    pub command_id: String,
    /// Arguments the command was invoked with
    pub command_args: Map<String, Value>,
}

impl CommandInvocation {
    pub fn new(session_id: impl Into<String>, command_id: impl Into<String>, command_args: Map<String, Value>) -> Self {
        Self {
            session_id: session_id.into(),
            command_id: command_id.into(),
            command_args,
        }
    }
}

/// Schema-tagged wrapper sent to the event log endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub schema: String,
    pub version: u64,
    pub event: CommandInvocation,
}

impl EventEnvelope {
    /// Wrap a copy of `event` in the current schema and version
    pub fn new(event: &CommandInvocation) -> Self {
        Self::from(event.clone())
    }
}

impl From<CommandInvocation> for EventEnvelope {
    fn from(event: CommandInvocation) -> Self {
        Self {
            schema: COMMAND_INVOCATIONS_SCHEMA.to_string(),
            version: COMMAND_INVOCATIONS_VERSION,
            event,
        }
    }
}
