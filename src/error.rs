//! Error types for the admission gate and the registry client
use std::time::Duration;

/// Invalid gate configuration. Raised at construction, never from `acquire`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A window must admit at least one permit.
    #[error("capacity must be > 0 (got {provided})")]
    ZeroCapacity {
        /// Value provided by caller.
        provided: usize,
    },
    /// The permit ring for this capacity cannot be allocated.
    #[error("capacity {provided} is too large to allocate")]
    CapacityTooLarge {
        /// Value provided by caller.
        provided: usize,
    },
    /// The window duration cannot be added to a clock reading.
    #[error("window duration {0:?} is too large to be represented")]
    UnboundedDuration(Duration),
}

/// Outcome of an `acquire` call that did not end in a permit.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The wait was interrupted by a cancellation signal or by gate shutdown.
    #[error("permit acquisition cancelled while waiting")]
    Cancelled,
    /// The caller's deadline passed before a permit became available.
    #[error("no permit available within {limit:?}")]
    TimedOut {
        /// Deadline supplied by the caller.
        limit: Duration,
    },
}

impl GateError {
    /// Check if this error is due to cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
    /// Check if this error is due to timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Failure reported by a [`Transport`](crate::transport::Transport).
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The HTTP client failed to deliver the request or read the response.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors produced while building a [`RegistryClient`](crate::client::RegistryClient).
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// Rate window rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Endpoint is not a valid absolute URL.
    #[error("invalid endpoint url: {0}")]
    Endpoint(#[from] url::ParseError),
    /// Config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// Config document is malformed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// Header name or value rejected.
    #[error("invalid header: {0}")]
    Header(String),
    /// Underlying HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced by a document submission.
#[derive(thiserror::Error, Debug)]
pub enum SubmitError {
    /// The document could not be serialized. No permit was consumed.
    #[error("failed to serialize document: {0}")]
    Payload(#[source] serde_json::Error),
    /// The admission gate did not grant a permit.
    #[error(transparent)]
    Gate(#[from] GateError),
    /// The transport failed after the permit was granted.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The spawned dispatch task panicked or was aborted.
    #[error("dispatch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SubmitError {
    /// Borrow the gate error if the submission never got a permit.
    pub fn as_gate(&self) -> Option<&GateError> {
        match self {
            Self::Gate(e) => Some(e),
            _ => None,
        }
    }
}
