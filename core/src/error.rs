use crate::Endpoint;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum EndpointParseError {
    #[error("invalid endpoint {0:?}")]
    Malformed(String),
    #[error("missing hostname")]
    MissingHost,
    #[error("missing port in {0:?}")]
    MissingPort(String),
    #[error("the port number is not valid: {0}")]
    InvalidPort(String),
}

/// Listing routing objects failed; fatal to the cycle.
#[derive(Debug, Error)]
#[error("failed to list tls bindings: {source}")]
pub struct SourceError {
    #[source]
    pub source: BoxError,
}

impl SourceError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        SourceError { source: source.into() }
    }
}

/// Dialing or handshaking with an endpoint failed.
#[derive(Debug, Error)]
#[error("failed to get certificates from {endpoint}: {reason}")]
pub struct ConnectError {
    pub endpoint: Endpoint,
    pub reason: String,
}

impl ConnectError {
    pub fn new(endpoint: &Endpoint, reason: impl ToString) -> Self {
        ConnectError { endpoint: endpoint.clone(), reason: reason.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{notifier}: request failed: {source}")]
    Transport {
        notifier: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("{notifier}: rejected by backend: {message}")]
    Rejected { notifier: &'static str, message: String },
}

impl NotifyError {
    pub fn transport(notifier: &'static str, source: impl Into<BoxError>) -> Self {
        NotifyError::Transport { notifier, source: source.into() }
    }
}

#[derive(Debug, Error)]
pub enum SyntheticsError {
    #[error("no ownership tag is set for synthetic checks, refusing to reconcile")]
    MissingOwnershipTag,
    #[error("failed to list synthetic checks: {0}")]
    List(#[source] BoxError),
    #[error("failed to create synthetic check {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to delete {count} managed checks: {source}")]
    Delete {
        count: usize,
        #[source]
        source: BoxError,
    },
}

impl SyntheticsError {
    /// Whether the error aborts the cycle. Only a failed batch delete does.
    pub fn escapes_cycle(&self) -> bool {
        matches!(self, SyntheticsError::Delete { .. })
    }
}

/// Errors that escape a reconciliation cycle to the scheduler.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Synthetics(#[from] SyntheticsError),
}
