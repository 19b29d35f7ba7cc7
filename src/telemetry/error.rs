use thiserror::Error;

/// Why an event did not reach the event log
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The envelope could not be encoded as JSON
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No response was obtained (DNS, refused connection, timeout, ...)
    #[error("HTTP request failed: {0}")]
    Transport(#[from] ureq::Error),

    /// `emit` was awaited outside a tokio runtime
    #[error("No tokio runtime available to send the event")]
    NoRuntime,

    /// The server answered with something other than 204
    #[error("Event log responded {status}: {body}")]
    Response { status: u16, body: String },
}

impl DeliveryError {
    /// HTTP status of the rejected response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}
