//! Session state machine
//!
//! `SessionManager` tracks whether a user is signed in and announces every
//! transition on a broadcast channel. Consumers react to `SessionEvent`s
//! instead of polling, which is how out-of-band changes (a refresh that
//! fails, a revoked token) reach the rest of the application.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    AuthBackend, AuthError, AuthResult, AuthSession, AuthenticatedUser, SignUpOutcome,
    REFRESH_MARGIN_SECS, REFRESH_RETRY_SECS, SESSION_EVENT_CAPACITY,
};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignOutReason {
    /// The user signed out.
    UserRequested,
    /// The session could not be refreshed.
    Expired,
    /// The session was revoked elsewhere.
    Revoked,
}

/// A session transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A user signed in (or a stored session was restored).
    SignedIn(AuthenticatedUser),
    /// The session ended.
    SignedOut { reason: SignOutReason },
    /// The access token was renewed; the user is unchanged.
    TokenRefreshed(AuthenticatedUser),
}

/// Credentials for data requests made on behalf of the signed-in user
#[derive(Debug, Clone)]
pub struct SessionAccess {
    /// User ID that owns the data
    pub user_id: String,
    /// Bearer token
    pub access_token: String,
}

/// What is written to disk so a session survives restarts
#[derive(Serialize, Deserialize)]
struct PersistedSession {
    refresh_token: String,
    user: AuthenticatedUser,
}

/// Tracks the current session and publishes its transitions
pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
    current: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<SessionEvent>,
    persist_path: Option<PathBuf>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("persist_path", &self.persist_path)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a signed-out session manager
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            backend,
            current: RwLock::new(None),
            events,
            persist_path: None,
        }
    }

    /// Persist the session to `path` so it can be restored on the next start
    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    /// Subscribe to session transitions
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The signed-in user, if any
    pub async fn current_user(&self) -> Option<AuthenticatedUser> {
        self.current.read().await.as_ref().map(|s| s.user.clone())
    }

    /// Whether a session is active
    pub async fn is_signed_in(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Credentials for data requests, if signed in
    pub async fn access(&self) -> Option<SessionAccess> {
        self.current.read().await.as_ref().map(|s| SessionAccess {
            user_id: s.user.id.clone(),
            access_token: s.access_token.clone(),
        })
    }

    /// Sign in with email and password.
    ///
    /// On failure the current state is left untouched and the service's
    /// message is returned as `AuthError::Rejected`.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthenticatedUser> {
        let session = self.backend.sign_in_with_password(email, password).await?;
        let user = session.user.clone();
        self.establish(session).await;
        info!(user_id = %user.id, "User signed in");
        Ok(user)
    }

    /// Create an account. Only an immediately issued session signs the user in.
    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        let outcome = self.backend.sign_up(email, password).await?;
        match &outcome {
            SignUpOutcome::SignedIn(session) => {
                info!(user_id = %session.user.id, "Account created and signed in");
                self.establish(session.clone()).await;
            }
            SignUpOutcome::ConfirmationSent => {
                info!("Account created, confirmation email sent");
            }
        }
        Ok(outcome)
    }

    /// Sign out. Always ends in the signed-out state, even if the service
    /// cannot be reached.
    pub async fn sign_out(&self) {
        let previous = self.current.write().await.take();
        if let Some(session) = previous {
            if let Err(e) = self.backend.sign_out(&session.access_token).await {
                warn!(error = %e, "Remote sign-out failed, discarding session locally");
            }
            info!(user_id = %session.user.id, "User signed out");
        }
        self.forget().await;
        self.emit(SessionEvent::SignedOut {
            reason: SignOutReason::UserRequested,
        });
    }

    /// Renew the access token.
    ///
    /// A refresh the service rejects ends the session. When the service cannot
    /// be reached the session is kept and the error returned, so the caller can
    /// try again later.
    pub async fn refresh(&self) -> AuthResult<()> {
        let refresh_token = self
            .current
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(AuthError::NotSignedIn)?;

        match self.backend.refresh(&refresh_token).await {
            Ok(session) => {
                let user = session.user.clone();
                {
                    let mut current = self.current.write().await;
                    // Signed out or replaced while the refresh was in flight
                    if current.as_ref().map(|s| s.refresh_token.as_str())
                        != Some(refresh_token.as_str())
                    {
                        debug!("Discarding refresh result for a session that is gone");
                        return Ok(());
                    }
                    *current = Some(session.clone());
                }
                self.persist(&session).await;
                debug!(user_id = %user.id, "Session refreshed");
                self.emit(SessionEvent::TokenRefreshed(user));
                Ok(())
            }
            Err(e) if e.ends_session() => {
                warn!(error = %e, "Session refresh rejected");
                self.invalidate(SignOutReason::Expired).await;
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed, keeping session");
                Err(e)
            }
        }
    }

    /// End the session because of something that happened outside this process
    pub async fn invalidate(&self, reason: SignOutReason) {
        let previous = self.current.write().await.take();
        if let Some(session) = previous {
            info!(user_id = %session.user.id, reason = ?reason, "Session ended");
            self.forget().await;
            self.emit(SessionEvent::SignedOut { reason });
        }
    }

    /// Restore a persisted session, if one exists and can still be refreshed.
    ///
    /// The stored session is only discarded when the service rejects it. If the
    /// service cannot be reached the file is kept and the error returned.
    pub async fn restore(&self) -> AuthResult<Option<AuthenticatedUser>> {
        let Some(path) = self.persist_path.as_ref() else {
            return Ok(None);
        };
        if let Some(user) = self.current_user().await {
            return Ok(Some(user));
        }

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let persisted: PersistedSession = match serde_json::from_str(&contents) {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable stored session");
                self.forget().await;
                return Ok(None);
            }
        };

        match self.backend.refresh(&persisted.refresh_token).await {
            Ok(session) => {
                let user = session.user.clone();
                self.establish(session).await;
                info!(user_id = %user.id, "Restored stored session");
                Ok(Some(user))
            }
            Err(e) if e.ends_session() => {
                warn!(user_id = %persisted.user.id, error = %e, "Stored session is no longer valid");
                self.forget().await;
                Ok(None)
            }
            Err(e) => {
                warn!(user_id = %persisted.user.id, error = %e, "Could not check stored session");
                Err(e)
            }
        }
    }

    /// Restore the stored session in the background, retrying while the
    /// service is unreachable. Gives up once someone signs in meanwhile.
    pub fn spawn_restore_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.restore().await {
                    Ok(Some(user)) => {
                        info!(user = %user.display_name(), "Resumed previous session");
                        break;
                    }
                    Ok(None) => {
                        info!("No previous session, sign in to add contacts");
                        break;
                    }
                    Err(e) if e.is_transient() => {
                        debug!(retry_secs = REFRESH_RETRY_SECS, "Retrying session restore later");
                        tokio::time::sleep(Duration::from_secs(REFRESH_RETRY_SECS)).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to restore previous session");
                        break;
                    }
                }
            }
        })
    }

    /// Keep the session fresh in the background.
    ///
    /// The task sleeps until shortly before the access token expires, then
    /// refreshes it. If the service rejects the refresh the session is
    /// invalidated and subscribers receive `SignedOut { reason: Expired }`;
    /// if it cannot be reached the refresh is retried after a pause.
    pub fn spawn_refresh_task(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            let mut backoff: Option<Duration> = None;
            loop {
                let due = self
                    .current
                    .read()
                    .await
                    .as_ref()
                    .map(|s| s.refresh_due_in(REFRESH_MARGIN_SECS))
                    .map(|wait| backoff.take().map_or(wait, |b| wait.max(b)));

                match due {
                    None => match events.recv().await {
                        Ok(_) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    },
                    Some(wait) => {
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => match self.refresh().await {
                                Ok(()) => {}
                                Err(e) if e.is_transient() => {
                                    backoff = Some(Duration::from_secs(REFRESH_RETRY_SECS));
                                }
                                Err(e) => debug!(error = %e, "Background refresh ended the session"),
                            },
                            event = events.recv() => {
                                if let Err(RecvError::Closed) = event {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    async fn establish(&self, session: AuthSession) {
        let user = session.user.clone();
        *self.current.write().await = Some(session.clone());
        self.persist(&session).await;
        self.emit(SessionEvent::SignedIn(user));
    }

    fn emit(&self, event: SessionEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.events.send(event);
    }

    async fn persist(&self, session: &AuthSession) {
        let Some(path) = self.persist_path.as_ref() else {
            return;
        };
        if let Err(e) = write_session_file(path, session).await {
            warn!(path = %path.display(), error = %e, "Failed to store session");
        }
    }

    async fn forget(&self) {
        let Some(path) = self.persist_path.as_ref() else {
            return;
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stored session"),
        }
    }
}

async fn write_session_file(path: &std::path::Path, session: &AuthSession) -> AuthResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let persisted = PersistedSession {
        refresh_token: session.refresh_token.clone(),
        user: session.user.clone(),
    };
    tokio::fs::write(path, serde_json::to_vec(&persisted)?).await?;

    // Restrict the token file to the current user (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(())
}
