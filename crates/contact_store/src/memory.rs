//! In-memory contact store implementation for testing.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use entities::{Contact, NewContact};
use tokio::sync::RwLock;

use crate::{ContactStore, StoreError, StoreResult};

/// In-memory contact store for testing purposes.
///
/// Failures and latency can be injected to exercise callers' error and
/// concurrency handling.
#[derive(Debug, Default)]
pub struct MemoryContactStore {
    contacts: Arc<RwLock<Vec<Contact>>>,
    failure: Mutex<Option<String>>,
    list_delay: Mutex<Duration>,
    insert_delay: Mutex<Duration>,
    list_calls: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl MemoryContactStore {
    /// Creates an empty in-memory contact store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `contacts` (newest first).
    pub fn with_contacts(contacts: Vec<Contact>) -> Self {
        Self {
            contacts: Arc::new(RwLock::new(contacts)),
            ..Self::default()
        }
    }

    /// Makes every subsequent call fail with `message`, or succeed again with `None`.
    pub fn fail_with(&self, message: Option<&str>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = message.map(str::to_string);
        }
    }

    /// Delays every `list` call.
    pub fn set_list_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.list_delay.lock() {
            *d = delay;
        }
    }

    /// Delays every `insert` call.
    pub fn set_insert_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.insert_delay.lock() {
            *d = delay;
        }
    }

    /// Number of `list` calls so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `insert` calls so far.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Replaces the stored contacts without going through `insert`.
    pub async fn replace(&self, contacts: Vec<Contact>) {
        *self.contacts.write().await = contacts;
    }

    fn check_failure(&self) -> StoreResult<()> {
        match self.failure.lock().ok().and_then(|f| f.clone()) {
            Some(message) => Err(StoreError::Backend(message)),
            None => Ok(()),
        }
    }

    fn delay(slot: &Mutex<Duration>) -> Duration {
        slot.lock().map(|d| *d).unwrap_or_default()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn list(&self) -> StoreResult<Vec<Contact>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = Self::delay(&self.list_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_failure()?;
        Ok(self.contacts.read().await.clone())
    }

    async fn insert(&self, contact: NewContact) -> StoreResult<Contact> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let delay = Self::delay(&self.insert_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_failure()?;

        let contact = Contact::from_new(contact);
        self.contacts.write().await.insert(0, contact.clone());
        Ok(contact)
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_contact(name: &str) -> NewContact {
        NewContact {
            name: name.to_string(),
            city: "Lisbon".to_string(),
            country: "Portugal".to_string(),
            note: None,
            lat: 38.72,
            lon: -9.14,
        }
    }

    #[tokio::test]
    async fn test_insert_prepends() {
        let store = MemoryContactStore::new();
        store.insert(new_contact("First")).await.unwrap();
        store.insert(new_contact("Second")).await.unwrap();

        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Second", "First"]);
        assert_eq!(store.insert_calls(), 2);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryContactStore::new();
        store.fail_with(Some("permission denied for table contacts"));

        let err = store.insert(new_contact("Ana")).await.unwrap_err();
        assert_eq!(err.to_string(), "permission denied for table contacts");
        assert!(store.list().await.is_err());

        store.fail_with(None);
        assert!(store.list().await.unwrap().is_empty());
    }
}
