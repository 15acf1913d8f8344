//! Session error types.

use thiserror::Error;

/// Errors surfaced to callers of the session handle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A send was attempted while the socket is not connected. Also covers
    /// the failed state after retry exhaustion; the state watch tells the
    /// two apart.
    #[error("Not connected")]
    NotConnected,

    /// The session task has shut down.
    #[error("Session closed")]
    Closed,

    /// The configured server URL cannot be turned into a socket URI.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
