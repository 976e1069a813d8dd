//! Contact entity definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A person met somewhere in the world, shown as one pin on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Unique identifier (local UUID or backend-assigned id).
    pub id: String,
    /// Owning user ID (None in local mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Contact name.
    pub name: String,
    /// City where the contact was met.
    pub city: String,
    /// Country where the contact was met.
    pub country: String,
    /// Free-text note.
    #[serde(default)]
    pub note: Option<String>,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Creates a locally owned contact with a fresh UUID and timestamp.
    pub fn from_new(contact: NewContact) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: None,
            name: contact.name,
            city: contact.city,
            country: contact.country,
            note: contact.note,
            lat: contact.lat,
            lon: contact.lon,
            created_at: Utc::now(),
        }
    }

    /// Returns the "City, Country" label.
    pub fn location(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }

    /// Returns the note, if it has any visible content.
    pub fn note_text(&self) -> Option<&str> {
        self.note.as_deref().filter(|n| !n.trim().is_empty())
    }
}

/// A validated contact with resolved coordinates, ready to be persisted.
///
/// The persistence layer assigns the id, owner and creation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub city: String,
    pub country: String,
    pub note: Option<String>,
    pub lat: f64,
    pub lon: f64,
}
