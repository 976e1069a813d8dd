//! Contact form input and its validation.

use serde::{Deserialize, Serialize};

use crate::NewContact;

/// Raw contact form input, exactly as the user typed it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub note: String,
}

/// A draft whose required fields are present after trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub name: String,
    pub city: String,
    pub country: String,
    pub note: Option<String>,
}

impl ContactDraft {
    /// Creates a draft from its four fields.
    pub fn new(
        name: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            city: city.into(),
            country: country.into(),
            note: note.into(),
        }
    }

    /// Trims every field and checks that name, city and country are present.
    ///
    /// Returns `None` when any required field is empty or whitespace-only.
    pub fn validate(&self) -> Option<ValidDraft> {
        let name = self.name.trim();
        let city = self.city.trim();
        let country = self.country.trim();
        if name.is_empty() || city.is_empty() || country.is_empty() {
            return None;
        }

        let note = self.note.trim();
        Some(ValidDraft {
            name: name.to_string(),
            city: city.to_string(),
            country: country.to_string(),
            note: (!note.is_empty()).then(|| note.to_string()),
        })
    }
}

impl ValidDraft {
    /// The place string handed to the geocoder.
    pub fn place(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }

    /// Attaches resolved coordinates.
    pub fn with_coordinates(self, lat: f64, lon: f64) -> NewContact {
        NewContact {
            name: self.name,
            city: self.city,
            country: self.country,
            note: self.note,
            lat,
            lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_trims_fields() {
        let draft = ContactDraft::new("  Jordan Lee ", " Lisbon", "Portugal  ", " Met at Web Summit ");
        let valid = draft.validate().unwrap();

        assert_eq!(valid.name, "Jordan Lee");
        assert_eq!(valid.city, "Lisbon");
        assert_eq!(valid.country, "Portugal");
        assert_eq!(valid.note.as_deref(), Some("Met at Web Summit"));
        assert_eq!(valid.place(), "Lisbon, Portugal");
    }

    #[test]
    fn test_validate_rejects_blank_required_fields() {
        assert!(ContactDraft::new("", "Lisbon", "Portugal", "").validate().is_none());
        assert!(ContactDraft::new("Jordan", "   ", "Portugal", "").validate().is_none());
        assert!(ContactDraft::new("Jordan", "Lisbon", "\t\n", "").validate().is_none());
        assert!(ContactDraft::default().validate().is_none());
    }

    #[test]
    fn test_blank_note_becomes_none() {
        let valid = ContactDraft::new("Jordan", "Lisbon", "Portugal", "   ")
            .validate()
            .unwrap();
        assert_eq!(valid.note, None);

        let contact = valid.with_coordinates(38.72, -9.14);
        assert_eq!(contact.lat, 38.72);
        assert_eq!(contact.lon, -9.14);
        assert_eq!(contact.note, None);
    }
}
