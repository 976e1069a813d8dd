//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The auth service rejected the request. Carries its message verbatim.
    #[error("{0}")]
    Rejected(String),

    /// The auth service failed to answer (5xx). The request may succeed later.
    #[error("{0}")]
    Unavailable(String),

    /// No session is active.
    #[error("Not signed in")]
    NotSignedIn,

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Reading or writing the persisted session failed.
    #[error("Session storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Creates a rejection error from a service message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Whether the service refused the credentials themselves, so retrying
    /// them cannot succeed.
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Whether the service could not be reached or failed on its side.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Unavailable(_))
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
