//! Error types for the streaming protocol.

use std::sync::Arc;

/// The main error type for streaming sessions.
///
/// Errors are cloneable so that a single failure can be fanned out to every
/// hop of a session (and every subscriber of a hub) as an error token.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A source failed to produce an item
    #[error("source error: {0}")]
    Source(Arc<dyn std::error::Error + Send + Sync>),

    /// A sink failed to process an item
    #[error("sink error: {0}")]
    Sink(Arc<dyn std::error::Error + Send + Sync>),

    /// The runtime was shut down while sessions were still live
    #[error("runtime was shut down")]
    Shutdown,

    /// A session mailbox was closed unexpectedly
    #[error("session channel was closed unexpectedly")]
    ChannelClosed,

    /// Waiting on a deferred value timed out
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Create a source error from any error type
    pub fn source<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Source(Arc::new(error))
    }

    /// Create a sink error from any error type
    pub fn sink<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Sink(Arc::new(error))
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Error::Timeout { duration_ms }
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::Custom(format!("timeout: {}", e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::source(e)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;
