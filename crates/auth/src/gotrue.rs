//! Client for the hosted GoTrue auth API
//!
//! Endpoints used:
//! - `POST /auth/v1/token?grant_type=password` - sign in
//! - `POST /auth/v1/signup` - create an account
//! - `POST /auth/v1/token?grant_type=refresh_token` - refresh a session
//! - `POST /auth/v1/logout` - revoke a session

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{header::AUTHORIZATION, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{AuthBackend, AuthError, AuthResult, AuthSession, AuthenticatedUser, SignUpOutcome};

/// Header carrying the project's public API key
pub const API_KEY_HEADER: &str = "apikey";

/// Connection settings for the hosted backend service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Project URL (e.g., "https://abcd.supabase.co")
    pub url: String,

    /// Public (anon / publishable) API key
    pub api_key: String,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new service configuration
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Builds an endpoint URL from a path starting with `/`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }
}

/// Extracts a human-readable message from an error response body.
///
/// The hosted services report errors under different keys depending on the
/// endpoint; the first one present wins. Falls back to the raw body, then to
/// the status line.
pub fn service_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<JsonValue>(body) {
        for key in ["error_description", "msg", "message", "error"] {
            if let Some(message) = json.get(key).and_then(|v| v.as_str()) {
                if !message.is_empty() {
                    return message.to_string();
                }
            }
        }
    }

    let body = body.trim();
    if body.is_empty() {
        format!("Request failed with status {}", status)
    } else {
        body.to_string()
    }
}

/// Token response from the auth service
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token
    pub access_token: String,

    /// Refresh token
    pub refresh_token: String,

    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,

    /// Absolute expiry (unix seconds)
    #[serde(default)]
    pub expires_at: Option<i64>,

    /// The signed-in user
    pub user: UserResponse,
}

/// User object returned by the auth service
#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    /// User ID
    pub id: String,

    /// Email address
    #[serde(default)]
    pub email: Option<String>,
}

impl TokenResponse {
    /// Converts the wire response into a session
    pub fn into_session(self) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in.unwrap_or(3600)));

        let mut user = AuthenticatedUser::new(self.user.id);
        user.email = self.user.email;

        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user,
        }
    }
}

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// GoTrue auth API client
#[derive(Debug, Clone)]
pub struct GoTrueClient {
    /// Service configuration
    config: ServiceConfig,
    /// HTTP client
    http_client: reqwest::Client,
}

impl GoTrueClient {
    /// Create a new client
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// POST a JSON body and return the decoded success body or the service's error message
    async fn post(
        &self,
        path: &str,
        body: &impl Serialize,
        bearer: Option<&str>,
    ) -> AuthResult<Option<JsonValue>> {
        let url = self.config.endpoint(path);
        debug!(url = %url, "Auth request");

        let mut request = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(body);
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_server_error() {
            return Err(AuthError::Unavailable(service_error_message(status, &text)));
        }
        if !status.is_success() {
            return Err(AuthError::Rejected(service_error_message(status, &text)));
        }

        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn token_request(&self, path: &str, body: &impl Serialize) -> AuthResult<AuthSession> {
        let json = self
            .post(path, body, None)
            .await?
            .ok_or_else(|| AuthError::rejected("Empty token response"))?;
        let tokens: TokenResponse = serde_json::from_value(json)?;
        Ok(tokens.into_session())
    }
}

#[async_trait]
impl AuthBackend for GoTrueClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        self.token_request(
            "/auth/v1/token?grant_type=password",
            &PasswordCredentials { email, password },
        )
        .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        let json = self
            .post("/auth/v1/signup", &PasswordCredentials { email, password }, None)
            .await?;

        // With email confirmation enabled the service answers with the bare
        // user object and no tokens.
        match json {
            Some(json) if json.get("access_token").is_some() => {
                let tokens: TokenResponse = serde_json::from_value(json)?;
                Ok(SignUpOutcome::SignedIn(tokens.into_session()))
            }
            _ => Ok(SignUpOutcome::ConfirmationSent),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        self.token_request(
            "/auth/v1/token?grant_type=refresh_token",
            &RefreshRequest { refresh_token },
        )
        .await
    }

    async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        self.post("/auth/v1/logout", &serde_json::json!({}), Some(access_token))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn token_body(user_id: &str) -> JsonValue {
        serde_json::json!({
            "access_token": "access-1",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 4_102_444_800_i64,
            "refresh_token": "refresh-1",
            "user": { "id": user_id, "email": "ana@example.com" }
        })
    }

    async fn token_handler(
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
        Json(body): Json<JsonValue>,
    ) -> impl IntoResponse {
        if headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) != Some("anon-key") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "message": "No API key found in request" })),
            );
        }
        match params.get("grant_type").map(String::as_str) {
            Some("password") if body["password"] == "secret-pw" => {
                (StatusCode::OK, Json(token_body("user-1")))
            }
            Some("password") => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid login credentials"
                })),
            ),
            Some("refresh_token") if body["refresh_token"] == "refresh-1" => {
                (StatusCode::OK, Json(token_body("user-1")))
            }
            _ => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "msg": "Invalid Refresh Token" })),
            ),
        }
    }

    async fn stub_client(confirm_sign_up: bool) -> GoTrueClient {
        let router = Router::new()
            .route("/auth/v1/token", post(token_handler))
            .route(
                "/auth/v1/signup",
                post(move |Json(body): Json<JsonValue>| async move {
                    if confirm_sign_up {
                        Json(serde_json::json!({ "id": "user-2", "email": body["email"] }))
                    } else {
                        Json(token_body("user-2"))
                    }
                }),
            )
            .route("/auth/v1/logout", post(|| async { StatusCode::NO_CONTENT }))
            .route(
                "/auth/v1/outage/token",
                post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "upstream down") }),
            );
        let base = serve(router).await;
        GoTrueClient::new(ServiceConfig::new(base, "anon-key"))
    }

    #[test]
    fn test_service_error_message_precedence() {
        let status = StatusCode::BAD_REQUEST;
        assert_eq!(
            service_error_message(status, r#"{"error":"invalid_grant","error_description":"Bad"}"#),
            "Bad"
        );
        assert_eq!(service_error_message(status, r#"{"msg":"Nope"}"#), "Nope");
        assert_eq!(
            service_error_message(status, r#"{"code":"23502","message":"null value"}"#),
            "null value"
        );
        assert_eq!(service_error_message(status, "plain text"), "plain text");
        assert_eq!(
            service_error_message(status, ""),
            "Request failed with status 400 Bad Request"
        );
    }

    #[test]
    fn test_token_response_into_session() {
        let tokens: TokenResponse = serde_json::from_value(token_body("user-1")).unwrap();
        let session = tokens.into_session();

        assert_eq!(session.user.id, "user-1");
        assert_eq!(session.user.email.as_deref(), Some("ana@example.com"));
        assert_eq!(session.expires_at.timestamp(), 4_102_444_800);
    }

    #[test]
    fn test_service_config_trims_trailing_slash() {
        let config = ServiceConfig::new("https://demo.supabase.co/", "key");
        assert_eq!(
            config.endpoint("/rest/v1/contacts"),
            "https://demo.supabase.co/rest/v1/contacts"
        );
        assert!(!format!("{:?}", config).contains("key\""));
    }

    #[tokio::test]
    async fn test_sign_in_and_refresh() {
        let client = stub_client(false).await;

        let session = client
            .sign_in_with_password("ana@example.com", "secret-pw")
            .await
            .unwrap();
        assert_eq!(session.user.id, "user-1");
        assert_eq!(session.refresh_token, "refresh-1");

        let refreshed = client.refresh("refresh-1").await.unwrap();
        assert_eq!(refreshed.user.id, "user-1");

        let err = client.refresh("stale").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid Refresh Token");
    }

    #[tokio::test]
    async fn test_sign_in_rejection_is_verbatim() {
        let client = stub_client(false).await;
        let err = client
            .sign_in_with_password("ana@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[tokio::test]
    async fn test_sign_up_outcomes() {
        let client = stub_client(false).await;
        let outcome = client.sign_up("ana@example.com", "secret-pw").await.unwrap();
        assert!(matches!(outcome, SignUpOutcome::SignedIn(ref s) if s.user.id == "user-2"));

        let client = stub_client(true).await;
        let outcome = client.sign_up("ana@example.com", "secret-pw").await.unwrap();
        assert!(matches!(outcome, SignUpOutcome::ConfirmationSent));
    }

    #[tokio::test]
    async fn test_server_errors_are_transient() {
        let client = stub_client(false).await;
        let err = client
            .token_request("/auth/v1/outage/token", &RefreshRequest { refresh_token: "refresh-1" })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unavailable(_)));
        assert!(err.is_transient());
        assert!(!err.ends_session());
        assert_eq!(err.to_string(), "upstream down");

        let unreachable = GoTrueClient::new(ServiceConfig::new("http://127.0.0.1:1", "anon-key"));
        let err = unreachable.refresh("refresh-1").await.unwrap_err();
        assert!(matches!(err, AuthError::Http(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_sign_out_accepts_empty_body() {
        let client = stub_client(false).await;
        client.sign_out("access-1").await.unwrap();
    }
}
