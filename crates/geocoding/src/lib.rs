//! Geocoding for Network Map.
//!
//! Resolves a free-text place such as `"Lisbon, Portugal"` into a single
//! latitude/longitude match. Lookups never fail loudly: any transport error,
//! unexpected status or empty result is reported as "no match".

mod nominatim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use nominatim::*;

/// Public Nominatim search endpoint.
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Best single match for a place string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMatch {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Full name of the matched place as reported by the service.
    pub display_name: String,
}

/// Resolves place strings to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Looks up `place`, returning `None` when nothing matched or the lookup
    /// could not be completed.
    async fn geocode(&self, place: &str) -> Option<GeoMatch>;
}
