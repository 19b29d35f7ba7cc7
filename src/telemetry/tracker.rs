//! Host-facing entry point: one call per executed command

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::envelope::CommandInvocation;
use super::session::SessionId;
use super::sink::EventSink;

/// Turns "command executed" notifications into emitted events
///
/// Each notification is emitted on its own task. Delivery failures are
/// logged and dropped here; they never reach the code that ran the command.
pub struct CommandTracker<S> {
    session_id: SessionId,
    sink: Arc<S>,
}

impl<S: EventSink> CommandTracker<S> {
    pub fn new(session_id: impl Into<SessionId>, sink: S) -> Self {
        Self {
            session_id: session_id.into(),
            sink: Arc::new(sink),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Record that `command_id` ran with `command_args`
    ///
    /// Returns immediately. The returned handle resolves when the emit task
    /// finishes; `None` means no tokio runtime was available and the event
    /// was dropped.
    pub fn command_executed(&self, command_id: &str, command_args: &Map<String, Value>) -> Option<JoinHandle<()>> {
        let event = CommandInvocation::new(self.session_id.as_str(), command_id, command_args.clone());

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("No async runtime available, dropping telemetry for {}", command_id);
                return None;
            }
        };

        let sink = Arc::clone(&self.sink);
        Some(handle.spawn(async move {
            let command_id = event.command_id.clone();
            match sink.emit(event).await {
                Ok(()) => log::debug!("Delivered telemetry for {}", command_id),
                Err(e) => log::warn!("Failed to emit telemetry for {}: {}", command_id, e),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::error::DeliveryError;
    use crate::telemetry::handler::{ServerSettings, TelemetryHandler};
    use serde_json::json;
    use std::future::Future;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<CommandInvocation>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: CommandInvocation) -> impl Future<Output = Result<(), DeliveryError>> + Send {
            self.events.lock().unwrap().push(event);
            async { Ok(()) }
        }
    }

    struct RejectingSink;

    impl EventSink for RejectingSink {
        fn emit(&self, _event: CommandInvocation) -> impl Future<Output = Result<(), DeliveryError>> + Send {
            async {
                Err(DeliveryError::Response {
                    status: 500,
                    body: "down".to_string(),
                })
            }
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_events_carry_session_id() {
        let tracker = CommandTracker::new("session-1", RecordingSink::default());

        tracker
            .command_executed("notebook:run-cell", &args(json!({"cellIndex": 3})))
            .unwrap()
            .await
            .unwrap();
        tracker
            .command_executed("docmanager:save", &Map::new())
            .unwrap()
            .await
            .unwrap();

        let events = tracker.sink().events.lock().unwrap().clone();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.session_id == "session-1"));
        assert_eq!(events[0].command_id, "notebook:run-cell");
        assert_eq!(events[0].command_args, args(json!({"cellIndex": 3})));
    }

    #[tokio::test]
    async fn test_args_are_not_mutated() {
        let tracker = CommandTracker::new(SessionId::generate(), RecordingSink::default());
        let command_args = args(json!({"path": "a.ipynb"}));

        tracker.command_executed("docmanager:open", &command_args).unwrap().await.unwrap();

        assert_eq!(command_args, args(json!({"path": "a.ipynb"})));
    }

    #[tokio::test]
    async fn test_sink_failure_stays_in_task() {
        let tracker = CommandTracker::new("session-2", RejectingSink);

        let handle = tracker.command_executed("notebook:run-cell", &Map::new()).unwrap();

        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_does_not_reach_caller() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let settings = ServerSettings::new(format!("http://{}/", addr)).with_timeout(Duration::from_secs(5));
        let tracker = CommandTracker::new("session-3", TelemetryHandler::new(settings));

        let handle = tracker.command_executed("notebook:run-cell", &Map::new());

        assert!(handle.unwrap().await.is_ok());
    }

    #[test]
    fn test_without_runtime_event_is_dropped() {
        let tracker = CommandTracker::new("session-4", RecordingSink::default());

        let handle = tracker.command_executed("notebook:run-cell", &Map::new());

        assert!(handle.is_none());
        assert!(tracker.sink().events.lock().unwrap().is_empty());
    }
}
