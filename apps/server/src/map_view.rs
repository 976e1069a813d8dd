//! Map projection
//!
//! Turns the contact collection into what the page's map layer draws. The
//! page mounts the base map once and only swaps the marker layer when the
//! snapshot's revision changes.

use entities::Contact;
use serde::Serialize;

/// Initial map center, [lat, lon]
pub const DEFAULT_CENTER: [f64; 2] = [20.0, 0.0];

/// Initial zoom level (whole world)
pub const DEFAULT_ZOOM: u8 = 2;

/// Public OpenStreetMap tile server
pub const TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

pub const TILE_ATTRIBUTION: &str =
    "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors";

/// Placeholder shown when a contact has no note
pub const NO_NOTE: &str = "No note";

/// Content revealed when a marker is clicked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub name: String,
    /// "City, Country"
    pub location: String,
    pub note: String,
}

/// One pin on the map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub id: String,
    /// [lat, lon]
    pub position: [f64; 2],
    pub popup: Popup,
}

impl From<&Contact> for Marker {
    fn from(contact: &Contact) -> Self {
        Self {
            id: contact.id.clone(),
            position: [contact.lat, contact.lon],
            popup: Popup {
                name: contact.name.clone(),
                location: contact.location(),
                note: contact.note_text().unwrap_or(NO_NOTE).to_string(),
            },
        }
    }
}

/// Everything the page needs to draw the map
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSnapshot {
    pub center: [f64; 2],
    pub zoom: u8,
    pub tile_url: &'static str,
    pub attribution: &'static str,
    /// Collection revision the markers were projected from
    pub revision: u64,
    pub markers: Vec<Marker>,
}

/// One marker per contact, in collection order
pub fn project(contacts: &[Contact]) -> Vec<Marker> {
    contacts.iter().map(Marker::from).collect()
}

impl MapSnapshot {
    pub fn new(contacts: &[Contact], revision: u64) -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            tile_url: TILE_URL,
            attribution: TILE_ATTRIBUTION,
            revision,
            markers: project(contacts),
        }
    }
}
