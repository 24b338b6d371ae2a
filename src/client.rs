//! Error types and the terminal outcome of a decode.

use thiserror::Error;

/// Message used when a failed response carries no usable `error` field.
pub const GENERIC_REQUEST_FAILURE: &str = "Failed to process prompt";

/// Errors that can end a streamed completion.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Non-2xx response. Holds the server-provided message or the generic fallback.
    #[error("{0}")]
    Request(String),

    #[error("No response body")]
    NoBody,

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream cancelled")]
    Cancelled,

    #[error("Delta sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    /// True for caller-initiated aborts, which a UI usually reports silently.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    /// True for connection or read failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, StreamError::Transport(_) | StreamError::Io(_))
    }
}

/// Error returned by a delta consumer to abort the stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Terminal result of a single decode.
#[derive(Debug)]
pub enum StreamOutcome {
    /// The sentinel was seen or the server closed the stream cleanly.
    Completed,
    Failed(StreamError),
}

impl StreamOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamOutcome::Failed(e) if e.is_cancelled())
    }

    /// Human-readable failure reason, `None` when completed.
    pub fn reason(&self) -> Option<String> {
        match self {
            StreamOutcome::Completed => None,
            StreamOutcome::Failed(e) => Some(e.to_string()),
        }
    }

    pub fn error(&self) -> Option<&StreamError> {
        match self {
            StreamOutcome::Completed => None,
            StreamOutcome::Failed(e) => Some(e),
        }
    }

    /// Convert back into a `Result` for callers that want `?`.
    pub fn into_result(self) -> Result<(), StreamError> {
        match self {
            StreamOutcome::Completed => Ok(()),
            StreamOutcome::Failed(e) => Err(e),
        }
    }
}

impl From<Result<(), StreamError>> for StreamOutcome {
    fn from(result: Result<(), StreamError>) -> Self {
        match result {
            Ok(()) => StreamOutcome::Completed,
            Err(e) => StreamOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_displays_server_message() {
        let err = StreamError::Request("unauthorized".to_string());
        assert_eq!(err.to_string(), "unauthorized");
    }

    #[test]
    fn test_outcome_reason() {
        assert_eq!(StreamOutcome::Completed.reason(), None);

        let failed = StreamOutcome::Failed(StreamError::NoBody);
        assert_eq!(failed.reason().as_deref(), Some("No response body"));
        assert!(!failed.is_cancelled());
    }

    #[test]
    fn test_cancelled_is_distinct_from_transport() {
        let cancelled = StreamOutcome::Failed(StreamError::Cancelled);
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.error().is_some_and(StreamError::is_transport));

        let io = StreamError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(io.is_transport());
        assert!(!io.is_cancelled());
    }

    #[test]
    fn test_outcome_result_conversion() {
        assert!(StreamOutcome::from(Ok(())).is_completed());

        let outcome = StreamOutcome::from(Err(StreamError::Sink(SinkError::new("boom"))));
        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Delta sink failed: boom");
    }
}
