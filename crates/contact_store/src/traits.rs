//! Contact store trait definitions.

use async_trait::async_trait;
use entities::{Contact, NewContact};

use crate::StoreResult;

/// Trait for contact storage operations.
///
/// Implementations return contacts newest first.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Lists every stored contact, newest first.
    async fn list(&self) -> StoreResult<Vec<Contact>>;

    /// Stores a new contact and returns it as persisted (with id and timestamp).
    async fn insert(&self, contact: NewContact) -> StoreResult<Contact>;

    /// Short label for logs.
    fn kind(&self) -> &'static str;
}
