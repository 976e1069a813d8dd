//! Application state

use std::sync::Arc;

use auth::{GoTrueClient, SessionManager};
use contact_store::{ContactStore, LocalContactStore, RemoteContactStore};
use geocoding::{Geocoder, NominatimGeocoder};

use crate::{
    config::{BackendConfig, ServerConfig},
    controller::ContactListController,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Contact collection and add-contact flow
    pub controller: Arc<ContactListController>,

    /// Session manager (None in local mode)
    pub session: Option<Arc<SessionManager>>,

    /// Server configuration
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create a new application state
    pub async fn new(config: ServerConfig) -> Result<Self, StateError> {
        let geocoder: Arc<dyn Geocoder> = Arc::new(
            NominatimGeocoder::new(&config.geocoder_url).with_user_agent(&config.user_agent),
        );

        let (store, session): (Arc<dyn ContactStore>, Option<Arc<SessionManager>>) =
            match config.backend() {
                BackendConfig::Local { storage_path } => {
                    if let Some(parent) = storage_path.parent() {
                        tokio::fs::create_dir_all(parent).await.map_err(|e| {
                            StateError::Storage(format!("{}: {}", parent.display(), e))
                        })?;
                    }
                    tracing::info!(path = %storage_path.display(), "Storing contacts locally");
                    let store: Arc<dyn ContactStore> = Arc::new(LocalContactStore::new(storage_path));
                    (store, None)
                }
                BackendConfig::Remote {
                    service,
                    session_path,
                } => {
                    tracing::info!(url = %service.url, "Storing contacts in hosted backend");
                    let backend = Arc::new(GoTrueClient::new(service.clone()));
                    let session =
                        Arc::new(SessionManager::new(backend).with_persistence(session_path));
                    let store: Arc<dyn ContactStore> =
                        Arc::new(RemoteContactStore::new(service, session.clone()));
                    (store, Some(session))
                }
            };

        Ok(Self::from_parts(store, geocoder, session, config))
    }

    /// Assemble state from already-built components
    pub fn from_parts(
        store: Arc<dyn ContactStore>,
        geocoder: Arc<dyn Geocoder>,
        session: Option<Arc<SessionManager>>,
        config: ServerConfig,
    ) -> Self {
        let mut controller = ContactListController::new(store, geocoder);
        if let Some(session) = &session {
            controller = controller.with_session(session.clone());
        }

        Self {
            controller: Arc::new(controller),
            session,
            config: Arc::new(config),
        }
    }
}

/// State initialization errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to prepare contact storage: {0}")]
    Storage(String),
}
