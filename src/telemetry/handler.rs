//! HTTP delivery of command-invocation events to the event log endpoint

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use ureq::Agent;

use super::envelope::{CommandInvocation, EventEnvelope};
use super::error::DeliveryError;
use crate::config::ClientConfig;

/// Resource path of the event log endpoint, relative to the base URL
pub const EVENTLOG_PATH: &str = "eventlog";

const NO_CONTENT: u16 = 204;

/// Join a base URL and a path segment with exactly one `/` between them
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Connection settings for the event log server
///
/// Immutable once built: a client that needs different settings is a new client.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    base_url: String,
    token: Option<String>,
    cookie: Option<String>,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ServerSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            cookie: None,
            headers: Vec::new(),
            timeout: None,
        }
    }

    /// Send `Authorization: token <token>` with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Overall timeout for one request, connect through response body
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Full URL of the event log endpoint
    pub fn eventlog_url(&self) -> String {
        join_url(&self.base_url, EVENTLOG_PATH)
    }

    /// Headers carried on every request, in send order
    fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(ref token) = self.token {
            headers.push(("Authorization".to_string(), format!("token {}", token)));
        }
        if let Some(ref cookie) = self.cookie {
            headers.push(("Cookie".to_string(), cookie.clone()));
        }
        headers.extend(self.headers.iter().cloned());
        headers
    }
}

impl From<&ClientConfig> for ServerSettings {
    fn from(config: &ClientConfig) -> Self {
        let mut settings = Self::new(config.base_url.clone());
        if let Some(ref token) = config.token {
            settings = settings.with_token(token.clone());
        }
        if let Some(ref cookie) = config.cookie {
            settings = settings.with_cookie(cookie.clone());
        }
        for (name, value) in &config.headers {
            settings = settings.with_header(name.clone(), value.clone());
        }
        if config.timeout_secs > 0 {
            settings = settings.with_timeout(Duration::from_secs(config.timeout_secs));
        }
        settings
    }
}

/// Client that delivers command-invocation events to the event log endpoint
#[derive(Clone)]
pub struct TelemetryHandler {
    settings: Arc<ServerSettings>,
    agent: Agent,
}

impl fmt::Debug for TelemetryHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryHandler").field("settings", &self.settings).finish_non_exhaustive()
    }
}

impl TelemetryHandler {
    pub fn new(settings: ServerSettings) -> Self {
        // Non-2xx statuses come back as responses so the body can be reported
        let config = Agent::config_builder()
            .timeout_global(settings.timeout())
            .http_status_as_error(false)
            .build();

        Self {
            settings: Arc::new(settings),
            agent: Agent::new_with_config(config),
        }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Emit an event to the server
    ///
    /// Nothing happens until the returned future is polled. The request itself
    /// runs on the blocking pool, so awaiting it never stalls the executor.
    /// Awaited outside a tokio runtime it resolves to `DeliveryError::NoRuntime`.
    /// Resolves once the server answers 204; every other outcome is an error.
    pub fn emit(&self, event: CommandInvocation) -> impl Future<Output = Result<(), DeliveryError>> + Send + use<> {
        let settings = Arc::clone(&self.settings);
        let agent = self.agent.clone();

        async move {
            let envelope = EventEnvelope::from(event);
            let body = serde_json::to_vec(&envelope)?;

            log::debug!(
                "Emitting {} for session {}",
                envelope.event.command_id,
                envelope.event.session_id
            );

            let runtime = tokio::runtime::Handle::try_current().map_err(|_| DeliveryError::NoRuntime)?;
            runtime
                .spawn_blocking(move || put_event(&agent, &settings, body))
                .await
                .map_err(|e| DeliveryError::Transport(ureq::Error::Io(io::Error::other(e))))?
        }
    }
}

/// Issue the PUT and interpret the status
fn put_event(agent: &Agent, settings: &ServerSettings, body: Vec<u8>) -> Result<(), DeliveryError> {
    let url = settings.eventlog_url();

    let mut request = agent.put(&url);
    for (name, value) in settings.request_headers() {
        request = request.header(name.as_str(), value.as_str());
    }

    let mut response = request.send(&body[..])?;
    let status = response.status().as_u16();

    if status == NO_CONTENT {
        return Ok(());
    }

    let body = response.body_mut().read_to_string().unwrap_or_default();
    log::debug!("Event log at {} answered {}", url, status);
    Err(DeliveryError::Response { status, body })
}
