//! Authentication route handlers
//!
//! This module provides REST endpoints for email/password accounts:
//! - `/auth/status` - Whether accounts are enabled and who is signed in
//! - `/auth/sign-in` - Sign in with email and password
//! - `/auth/sign-up` - Create an account
//! - `/auth/sign-out` - End the session
//!
//! In local mode there are no accounts and every endpoint except
//! `/auth/status` answers with `auth_disabled`.

use std::sync::Arc;

use auth::{AuthError, AuthenticatedUser, SessionManager, SignUpOutcome};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::state::AppState;

/// Message shown after a sign-up that needs email confirmation
pub const CONFIRMATION_SENT_MESSAGE: &str = "Check your email to confirm your account.";

/// Email/password credentials
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Auth status response
#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    /// Whether accounts are enabled (remote mode)
    pub enabled: bool,

    /// Signed-in user, if any
    pub user: Option<AuthenticatedUser>,
}

/// Sign-in / sign-up response
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// "signed_in" or "confirmation_sent"
    pub status: &'static str,

    /// Signed-in user (when a session was issued)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthenticatedUser>,

    /// Message for the user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    /// Error code
    pub error: String,

    /// Human-readable error description
    pub error_description: String,

    #[serde(skip)]
    status: StatusCode,
}

impl AuthErrorResponse {
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: description.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    /// Override the HTTP status (400 by default)
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    fn disabled() -> Self {
        Self::new("auth_disabled", "Accounts are not enabled on this server")
            .with_status(StatusCode::NOT_FOUND)
    }
}

impl From<AuthError> for AuthErrorResponse {
    fn from(error: AuthError) -> Self {
        match error {
            // The service's own message, shown to the user as-is
            AuthError::Rejected(message) => Self::new("auth_rejected", message),
            AuthError::NotSignedIn => {
                Self::new("not_signed_in", "Not signed in").with_status(StatusCode::UNAUTHORIZED)
            }
            AuthError::Http(e) => {
                warn!(error = %e, "Auth service unreachable");
                Self::new("service_unavailable", e.to_string()).with_status(StatusCode::BAD_GATEWAY)
            }
            AuthError::Unavailable(message) => {
                warn!(error = %message, "Auth service failed");
                Self::new("service_unavailable", message).with_status(StatusCode::BAD_GATEWAY)
            }
            other => Self::new("server_error", other.to_string())
                .with_status(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for AuthErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

fn session_manager(state: &AppState) -> Result<&Arc<SessionManager>, AuthErrorResponse> {
    state.session.as_ref().ok_or_else(AuthErrorResponse::disabled)
}

/// Check if auth is enabled and who is signed in
pub async fn auth_status(State(state): State<AppState>) -> Json<AuthStatusResponse> {
    let user = match &state.session {
        Some(session) => session.current_user().await,
        None => None,
    };

    Json(AuthStatusResponse {
        enabled: state.session.is_some(),
        user,
    })
}

/// Sign in with email and password
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, AuthErrorResponse> {
    let session = session_manager(&state)?;
    let user = session
        .sign_in(request.email.trim(), &request.password)
        .await
        .map_err(|e| {
            info!(error = %e, "Sign-in rejected");
            AuthErrorResponse::from(e)
        })?;

    Ok(Json(SessionResponse {
        status: "signed_in",
        user: Some(user),
        message: None,
    }))
}

/// Create an account
pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, AuthErrorResponse> {
    let session = session_manager(&state)?;
    let outcome = session
        .sign_up(request.email.trim(), &request.password)
        .await
        .map_err(|e| {
            info!(error = %e, "Sign-up rejected");
            AuthErrorResponse::from(e)
        })?;

    let response = match outcome {
        SignUpOutcome::SignedIn(session) => SessionResponse {
            status: "signed_in",
            user: Some(session.user),
            message: None,
        },
        SignUpOutcome::ConfirmationSent => SessionResponse {
            status: "confirmation_sent",
            user: None,
            message: Some(CONFIRMATION_SENT_MESSAGE.to_string()),
        },
    };
    Ok(Json(response))
}

/// End the session
pub async fn sign_out(State(state): State<AppState>) -> Result<StatusCode, AuthErrorResponse> {
    session_manager(&state)?.sign_out().await;
    Ok(StatusCode::NO_CONTENT)
}
