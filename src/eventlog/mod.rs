//! Server side of the telemetry pipeline
//!
//! Receives envelopes on `PUT <base_url>/eventlog`, checks them against
//! registered schemas, and records filtered capsules to:
//! - File (JSONL) - one file per day under the configured log dir
//! - Stdout - prints formatted events

pub mod api;
pub mod recorder;
pub mod schema;

pub use api::{AppState, create_router};
pub use recorder::EventLog;
pub use schema::SchemaRegistry;
