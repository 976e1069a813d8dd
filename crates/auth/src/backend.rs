//! Auth backend abstraction
//!
//! The session manager talks to the auth service through this trait. The
//! hosted service is reached with `GoTrueClient`; `MemoryAuthBackend` keeps
//! accounts in memory for tests and offline development.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock,
    },
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{AuthError, AuthResult, AuthSession, AuthenticatedUser, SignUpOutcome};

/// Minimum password length accepted by the in-memory backend
const MIN_PASSWORD_LEN: usize = 6;

/// Trait for email/password auth services
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Authenticate with email and password
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<AuthSession>;

    /// Create an account
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome>;

    /// Exchange a refresh token for a new session
    async fn refresh(&self, refresh_token: &str) -> AuthResult<AuthSession>;

    /// Revoke the session identified by the access token
    async fn sign_out(&self, access_token: &str) -> AuthResult<()>;
}

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    password: String,
    confirmed: bool,
}

/// In-memory auth backend (for testing and offline mode)
#[derive(Debug)]
pub struct MemoryAuthBackend {
    accounts: RwLock<HashMap<String, Account>>,
    refresh_tokens: RwLock<HashMap<String, AuthenticatedUser>>,
    require_confirmation: bool,
    session_ttl_secs: i64,
    fail_refresh: AtomicBool,
    unavailable: AtomicBool,
}

impl Default for MemoryAuthBackend {
    fn default() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            refresh_tokens: RwLock::new(HashMap::new()),
            require_confirmation: false,
            session_ttl_secs: 3600,
            fail_refresh: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl MemoryAuthBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Require email confirmation before sign-up issues a session
    pub fn with_email_confirmation(mut self) -> Self {
        self.require_confirmation = true;
        self
    }

    /// Set the lifetime of issued sessions
    pub fn with_session_ttl_secs(mut self, secs: i64) -> Self {
        self.session_ttl_secs = secs;
        self
    }

    /// Register a confirmed account, returning its user ID
    pub fn add_account(&self, email: &str, password: &str) -> String {
        let user_id = Uuid::new_v4().to_string();
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(
                email.to_lowercase(),
                Account {
                    user_id: user_id.clone(),
                    password: password.to_string(),
                    confirmed: true,
                },
            );
        }
        user_id
    }

    /// Make every subsequent refresh fail, as if the session was revoked elsewhere
    pub fn revoke_refresh_tokens(&self) {
        self.fail_refresh.store(true, Ordering::SeqCst);
    }

    /// Simulate a service outage: refreshes fail with `AuthError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn issue_session(&self, user: AuthenticatedUser) -> AuthResult<AuthSession> {
        let refresh_token = Uuid::new_v4().to_string();
        self.refresh_tokens
            .write()
            .map_err(|e| AuthError::rejected(format!("Lock poisoned: {}", e)))?
            .insert(refresh_token.clone(), user.clone());

        Ok(AuthSession {
            access_token: Uuid::new_v4().to_string(),
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(self.session_ttl_secs),
            user,
        })
    }
}

#[async_trait]
impl AuthBackend for MemoryAuthBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let email = email.trim().to_lowercase();
        let account = self
            .accounts
            .read()
            .map_err(|e| AuthError::rejected(format!("Lock poisoned: {}", e)))?
            .get(&email)
            .cloned();

        match account {
            Some(account) if account.password == password => {
                if !account.confirmed {
                    return Err(AuthError::rejected("Email not confirmed"));
                }
                self.issue_session(AuthenticatedUser::new(account.user_id).with_email(email))
            }
            _ => Err(AuthError::rejected("Invalid login credentials")),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AuthError::rejected("Anonymous sign-ins are disabled"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::rejected(
                "Password should be at least 6 characters.",
            ));
        }

        let user_id = Uuid::new_v4().to_string();
        {
            let mut accounts = self
                .accounts
                .write()
                .map_err(|e| AuthError::rejected(format!("Lock poisoned: {}", e)))?;
            if accounts.contains_key(&email) {
                return Err(AuthError::rejected("User already registered"));
            }
            accounts.insert(
                email.clone(),
                Account {
                    user_id: user_id.clone(),
                    password: password.to_string(),
                    confirmed: !self.require_confirmation,
                },
            );
        }

        if self.require_confirmation {
            return Ok(SignUpOutcome::ConfirmationSent);
        }

        let session = self.issue_session(AuthenticatedUser::new(user_id).with_email(email))?;
        Ok(SignUpOutcome::SignedIn(session))
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthError::Unavailable("Service unavailable".to_string()));
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::rejected(
                "Invalid Refresh Token: Refresh Token Not Found",
            ));
        }

        let user = self
            .refresh_tokens
            .write()
            .map_err(|e| AuthError::rejected(format!("Lock poisoned: {}", e)))?
            .remove(refresh_token);

        match user {
            Some(user) => self.issue_session(user),
            None => Err(AuthError::rejected(
                "Invalid Refresh Token: Refresh Token Not Found",
            )),
        }
    }

    async fn sign_out(&self, _access_token: &str) -> AuthResult<()> {
        Ok(())
    }
}
