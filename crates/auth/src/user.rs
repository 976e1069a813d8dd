//! User and session types for authentication

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// User ID
    pub id: String,

    /// Email address (if available)
    pub email: Option<String>,
}

impl AuthenticatedUser {
    /// Creates a new authenticated user
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }

    /// Sets the email
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Returns the display name, falling back to the ID
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.id)
    }
}

/// An active session issued by the auth service
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for data requests
    pub access_token: String,

    /// Token used to obtain a new access token
    pub refresh_token: String,

    /// When the access token expires
    pub expires_at: DateTime<Utc>,

    /// The signed-in user
    pub user: AuthenticatedUser,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

impl AuthSession {
    /// Checks whether the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Time left until the session should be refreshed, given a safety margin.
    ///
    /// Returns zero when the refresh is already due.
    pub fn refresh_due_in(&self, margin_secs: i64) -> std::time::Duration {
        let due = self.expires_at - Duration::seconds(margin_secs);
        (due - Utc::now()).to_std().unwrap_or_default()
    }
}

/// Result of an account creation attempt
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// The account was created and a session issued immediately.
    SignedIn(AuthSession),
    /// The account was created but must be confirmed by email first.
    ConfirmationSent,
}
