//! Error types for credential handling.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur managing credentials.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A REST call to the auth endpoints failed.
    #[error("API error: {0}")]
    Api(#[from] parley_api::Error),

    /// Durable storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored credential could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An operation required a credential and none is present.
    #[error("Not authenticated")]
    NotAuthenticated,
}
