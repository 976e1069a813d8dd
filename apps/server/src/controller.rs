//! Contact list controller
//!
//! Owns the newest-first contact collection and the form state around it,
//! and runs the add-contact flow: validate, check the session, geocode,
//! persist, prepend. Every state change is announced on a broadcast channel
//! so the page can re-fetch and redraw.
//!
//! Reloads and inserts can overlap (a sign-in triggers a reload while an
//! insert is still in flight). Two counters keep the collection consistent:
//! the session generation changes on every sign-in and sign-out, and results
//! that belong to an older generation are dropped; the insert sequence number
//! lets a reload keep contacts that were inserted after its list request was
//! sent and are therefore missing from its result.

use std::sync::Arc;

use auth::{AuthenticatedUser, SessionEvent, SessionManager};
use contact_store::{ContactStore, StoreResult};
use entities::{Contact, ContactDraft};
use geocoding::Geocoder;
use serde::Serialize;
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// How many contacts the "recent" list shows
pub const RECENT_LIMIT: usize = 6;

/// Capacity of the controller event channel
const EVENT_CAPACITY: usize = 64;

pub const STATUS_INVALID: &str = "Add a name, city, and country to drop the marker.";
pub const STATUS_SIGN_IN_REQUIRED: &str = "Sign in to add contacts.";
pub const STATUS_LOOKING_UP: &str = "Looking up location...";
pub const STATUS_NOT_FOUND: &str = "Could not find that location. Try a larger city or region.";
pub const STATUS_SESSION_CHANGED: &str =
    "The account changed before the contact was saved. Sign in again to see it.";

/// Result of an add-contact attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// The contact was stored and is now first in the collection.
    Added(Contact),
    /// Name, city or country was missing.
    Invalid,
    /// Remote mode without a session.
    SignInRequired,
    /// Another add-contact is still running.
    Busy,
    /// The geocoder found no match for the place.
    NotFound,
    /// The store rejected the contact; carries the message shown to the user.
    Failed(String),
    /// Stored for the account that was signed in when the add started, which
    /// has since signed out. Not part of the current collection.
    SessionChanged(Contact),
}

/// Notification that the observable state changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// `revision` is the collection revision after the change.
    Changed { revision: u64 },
}

/// Snapshot of everything the page renders outside the map
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub mode: &'static str,
    pub requires_auth: bool,
    pub user: Option<AuthenticatedUser>,
    pub total_count: usize,
    pub recent: Vec<Contact>,
    pub draft: ContactDraft,
    pub status: Option<String>,
    pub loading: bool,
    pub revision: u64,
}

#[derive(Debug, Default)]
struct ControllerState {
    contacts: Vec<Contact>,
    draft: ContactDraft,
    status: Option<String>,
    loading: bool,
    /// Bumped on every change to `contacts`
    revision: u64,
    /// Bumped on every sign-in and sign-out
    session_generation: u64,
    /// Bumped on every applied insert
    insert_seq: u64,
    reloads_in_flight: usize,
    /// Inserts applied while a reload was in flight, oldest first
    inserted_during_reload: Vec<(u64, Contact)>,
}

impl ControllerState {
    fn set_contacts(&mut self, contacts: Vec<Contact>) {
        self.contacts = contacts;
        self.revision += 1;
    }

    fn clear_for_session_change(&mut self) {
        self.session_generation += 1;
        self.inserted_during_reload.clear();
        self.status = None;
        if !self.contacts.is_empty() {
            self.set_contacts(Vec::new());
        }
    }
}

/// Owns the contact collection and runs add-contact
pub struct ContactListController {
    store: Arc<dyn ContactStore>,
    geocoder: Arc<dyn Geocoder>,
    /// Present in remote mode only
    session: Option<Arc<SessionManager>>,
    state: RwLock<ControllerState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl std::fmt::Debug for ContactListController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactListController")
            .field("store", &self.store.kind())
            .field("requires_auth", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl ContactListController {
    /// Create a controller for local mode (no accounts)
    pub fn new(store: Arc<dyn ContactStore>, geocoder: Arc<dyn Geocoder>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            geocoder,
            session: None,
            state: RwLock::new(ControllerState::default()),
            events,
        }
    }

    /// Gate writes behind `session` (remote mode)
    pub fn with_session(mut self, session: Arc<SessionManager>) -> Self {
        self.session = Some(session);
        self
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Whether adding contacts requires a signed-in user
    pub fn requires_auth(&self) -> bool {
        self.session.is_some()
    }

    /// Number of contacts in the collection
    pub async fn total_count(&self) -> usize {
        self.state.read().await.contacts.len()
    }

    /// The newest contacts, at most `RECENT_LIMIT`
    pub async fn recent(&self) -> Vec<Contact> {
        self.state
            .read()
            .await
            .contacts
            .iter()
            .take(RECENT_LIMIT)
            .cloned()
            .collect()
    }

    /// The whole collection, newest first
    pub async fn contacts(&self) -> Vec<Contact> {
        self.state.read().await.contacts.clone()
    }

    /// Current collection revision
    pub async fn revision(&self) -> u64 {
        self.state.read().await.revision
    }

    /// The whole collection together with its revision
    pub async fn contacts_with_revision(&self) -> (Vec<Contact>, u64) {
        let state = self.state.read().await;
        (state.contacts.clone(), state.revision)
    }

    /// Snapshot for rendering
    pub async fn view_state(&self) -> ViewState {
        let user = match &self.session {
            Some(session) => session.current_user().await,
            None => None,
        };
        let state = self.state.read().await;
        ViewState {
            mode: if self.session.is_some() { "remote" } else { "local" },
            requires_auth: self.session.is_some(),
            user,
            total_count: state.contacts.len(),
            recent: state.contacts.iter().take(RECENT_LIMIT).cloned().collect(),
            draft: state.draft.clone(),
            status: state.status.clone(),
            loading: state.loading,
            revision: state.revision,
        }
    }

    /// Validate, geocode and store a contact, then prepend it to the collection
    pub async fn add_contact(&self, draft: ContactDraft) -> AddOutcome {
        let Some(valid) = draft.validate() else {
            self.update(|state| {
                state.draft = draft;
                state.status = Some(STATUS_INVALID.to_string());
            })
            .await;
            return AddOutcome::Invalid;
        };

        if !self.is_signed_in_or_local().await {
            self.update(|state| {
                state.draft = draft;
                state.status = Some(STATUS_SIGN_IN_REQUIRED.to_string());
            })
            .await;
            return AddOutcome::SignInRequired;
        }

        let generation = {
            let mut state = self.state.write().await;
            if state.loading {
                return AddOutcome::Busy;
            }
            state.loading = true;
            state.draft = draft;
            state.status = Some(STATUS_LOOKING_UP.to_string());
            state.session_generation
        };
        self.notify().await;

        let place = valid.place();
        let Some(found) = self.geocoder.geocode(&place).await else {
            debug!(place = %place, "No geocoding match");
            self.update(|state| {
                state.loading = false;
                state.status = Some(STATUS_NOT_FOUND.to_string());
            })
            .await;
            return AddOutcome::NotFound;
        };

        let contact = match self.store.insert(valid.with_coordinates(found.lat, found.lon)).await {
            Ok(contact) => contact,
            Err(e) => {
                let message = e.to_string();
                warn!(store = self.store.kind(), error = %message, "Failed to store contact");
                self.update(|state| {
                    state.loading = false;
                    state.status = Some(message.clone());
                })
                .await;
                return AddOutcome::Failed(message);
            }
        };

        let current_session = {
            let mut state = self.state.write().await;
            state.loading = false;
            if state.session_generation != generation {
                // Stored for a session that has since ended
                debug!(id = %contact.id, "Session changed during insert, not showing contact");
                state.status = Some(STATUS_SESSION_CHANGED.to_string());
                false
            } else {
                state.insert_seq += 1;
                let seq = state.insert_seq;
                if state.reloads_in_flight > 0 {
                    state.inserted_during_reload.push((seq, contact.clone()));
                }
                let mut contacts = std::mem::take(&mut state.contacts);
                contacts.insert(0, contact.clone());
                state.set_contacts(contacts);
                state.draft = ContactDraft::default();
                state.status = Some(format!("Added {} in {}.", contact.name, contact.city));
                true
            }
        };
        self.notify().await;

        if !current_session {
            return AddOutcome::SessionChanged(contact);
        }

        info!(
            id = %contact.id,
            name = %contact.name,
            city = %contact.city,
            "Contact added"
        );
        AddOutcome::Added(contact)
    }

    /// Replace the collection with the store's contents.
    ///
    /// In remote mode without a session the collection is simply emptied.
    /// Returns the size of the collection after the reload was applied.
    pub async fn reload(&self) -> StoreResult<usize> {
        if !self.is_signed_in_or_local().await {
            self.update(|state| {
                if !state.contacts.is_empty() {
                    state.set_contacts(Vec::new());
                }
            })
            .await;
            return Ok(0);
        }

        let (generation, started_seq) = {
            let mut state = self.state.write().await;
            state.reloads_in_flight += 1;
            (state.session_generation, state.insert_seq)
        };

        let result = self.store.list().await;

        let applied = {
            let mut state = self.state.write().await;
            state.reloads_in_flight -= 1;

            let applied = match result {
                Ok(_) if state.session_generation != generation => {
                    debug!("Session changed during reload, discarding result");
                    Ok(state.contacts.len())
                }
                Ok(listed) => {
                    // Inserts that landed after the list request went out
                    let mut kept: Vec<Contact> = state
                        .inserted_during_reload
                        .iter()
                        .filter(|(seq, contact)| {
                            *seq > started_seq && !listed.iter().any(|c| c.id == contact.id)
                        })
                        .map(|(_, contact)| contact.clone())
                        .collect();
                    kept.reverse();
                    kept.extend(listed);
                    let count = kept.len();
                    state.set_contacts(kept);
                    Ok(count)
                }
                Err(e) => {
                    warn!(store = self.store.kind(), error = %e, "Failed to load contacts");
                    state.status = Some(e.to_string());
                    Err(e)
                }
            };

            if state.reloads_in_flight == 0 {
                state.inserted_during_reload.clear();
            }
            applied
        };
        self.notify().await;

        if let Ok(count) = &applied {
            debug!(store = self.store.kind(), count, "Contacts loaded");
        }
        applied
    }

    /// React to a session transition
    pub async fn handle_session_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::SignedIn(user) => {
                info!(user_id = %user.id, "Loading contacts for signed-in user");
                self.update(ControllerState::clear_for_session_change).await;
                if let Err(e) = self.reload().await {
                    debug!(error = %e, "Reload after sign-in failed");
                }
            }
            SessionEvent::SignedOut { reason } => {
                info!(reason = ?reason, "Clearing contacts after sign-out");
                self.update(ControllerState::clear_for_session_change).await;
            }
            SessionEvent::TokenRefreshed(_) => {}
        }
    }

    /// Follow session transitions in the background (remote mode).
    ///
    /// Returns `None` in local mode, where there is no session to follow.
    pub fn spawn_session_listener(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let mut events = self.session.as_ref()?.subscribe();
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.handle_session_event(&event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed session events, resynchronizing");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    async fn resync(&self) {
        self.update(ControllerState::clear_for_session_change).await;
        if let Err(e) = self.reload().await {
            debug!(error = %e, "Resynchronizing reload failed");
        }
    }

    async fn is_signed_in_or_local(&self) -> bool {
        match &self.session {
            Some(session) => session.is_signed_in().await,
            None => true,
        }
    }

    async fn update(&self, f: impl FnOnce(&mut ControllerState)) {
        f(&mut *self.state.write().await);
        self.notify().await;
    }

    async fn notify(&self) {
        let revision = self.state.read().await.revision;
        // Ignore send errors (no subscribers)
        let _ = self.events.send(ControllerEvent::Changed { revision });
    }
}
