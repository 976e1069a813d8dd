//! JSON file contact store for single-user mode.
//!
//! The whole collection lives in one file as a JSON array, newest first.
//! Every insert rewrites the file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use entities::{Contact, NewContact};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{ContactStore, StoreResult};

/// File name used when only a data directory is configured.
pub const CONTACTS_FILE_NAME: &str = "contacts.json";

/// Contact store backed by a single JSON file.
#[derive(Debug)]
pub struct LocalContactStore {
    path: PathBuf,
    /// In-memory copy; `None` until the file has been read once.
    contacts: RwLock<Option<Vec<Contact>>>,
}

impl LocalContactStore {
    /// Creates a store that reads and writes `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contacts: RwLock::new(None),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file. Missing or malformed data reads as an empty collection.
    async fn read_file(&self) -> Vec<Contact> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored contacts yet");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read stored contacts");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Contact>>(&contents) {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed stored contacts");
                Vec::new()
            }
        }
    }

    async fn write_file(&self, contacts: &[Contact]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(contacts)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl ContactStore for LocalContactStore {
    async fn list(&self) -> StoreResult<Vec<Contact>> {
        let contacts = self.read_file().await;
        *self.contacts.write().await = Some(contacts.clone());
        Ok(contacts)
    }

    async fn insert(&self, contact: NewContact) -> StoreResult<Contact> {
        let contact = Contact::from_new(contact);

        let mut guard = self.contacts.write().await;
        if guard.is_none() {
            *guard = Some(self.read_file().await);
        }
        // The in-memory copy only changes once the file write succeeded
        let mut contacts = Vec::with_capacity(guard.as_ref().map_or(0, Vec::len) + 1);
        contacts.push(contact.clone());
        contacts.extend(guard.iter().flatten().cloned());
        self.write_file(&contacts).await?;

        debug!(id = %contact.id, total = contacts.len(), "Stored contact locally");
        *guard = Some(contacts);
        Ok(contact)
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}
