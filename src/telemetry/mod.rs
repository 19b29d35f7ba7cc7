//! Client-side command telemetry
//!
//! - `envelope` - command-invocation events and their schema wrapper
//! - `handler` - HTTP delivery to the server's event log endpoint
//! - `sink` - the emit capability callers program against
//! - `tracker` - host-facing "command executed" entry point

#![allow(dead_code)] // accessors used by embedding hosts, not by the CLI

pub mod envelope;
pub mod error;
pub mod handler;
pub mod session;
pub mod sink;
pub mod tracker;

pub use envelope::{COMMAND_INVOCATIONS_SCHEMA, COMMAND_INVOCATIONS_VERSION, CommandInvocation, EventEnvelope};
pub use error::DeliveryError;
pub use handler::{ServerSettings, TelemetryHandler, join_url};
pub use session::SessionId;
pub use sink::EventSink;
pub use tracker::CommandTracker;
