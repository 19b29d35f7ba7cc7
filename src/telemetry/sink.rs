use std::future::Future;

use super::envelope::CommandInvocation;
use super::error::DeliveryError;
use super::handler::TelemetryHandler;

/// Something that accepts command-invocation events
///
/// Callers only ever see this trait, so a sink that buffers and flushes in
/// batches can replace the immediate HTTP sink without touching them.
pub trait EventSink: Send + Sync + 'static {
    /// Deliver one event; the future settles with the delivery outcome
    fn emit(&self, event: CommandInvocation) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

impl EventSink for TelemetryHandler {
    fn emit(&self, event: CommandInvocation) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        TelemetryHandler::emit(self, event)
    }
}
