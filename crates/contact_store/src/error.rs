//! Contact store error types.

use thiserror::Error;

/// Errors that can occur during contact store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store requires a signed-in user.
    #[error("Sign in to add contacts.")]
    NotAuthenticated,

    /// The backend rejected the request. Carries its message verbatim.
    #[error("{0}")]
    Backend(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// File system error.
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a backend error from a service message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Result type for contact store operations.
pub type StoreResult<T> = Result<T, StoreError>;
