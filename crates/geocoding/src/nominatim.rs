//! Nominatim (OpenStreetMap) geocoder client

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::{GeoMatch, Geocoder};

/// Default user agent sent with lookups. Nominatim rejects anonymous clients.
pub const DEFAULT_USER_AGENT: &str = concat!("network-map/", env!("CARGO_PKG_VERSION"));

/// One entry of a Nominatim search response.
///
/// Coordinates are returned as decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct NominatimPlace {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: String,
}

impl NominatimPlace {
    /// Converts the raw entry into a match, rejecting non-numeric coordinates.
    pub fn to_match(&self) -> Option<GeoMatch> {
        let lat = self.lat.trim().parse::<f64>().ok()?;
        let lon = self.lon.trim().parse::<f64>().ok()?;
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        Some(GeoMatch {
            lat,
            lon,
            display_name: self.display_name.clone(),
        })
    }
}

/// Picks the first usable place from a decoded search response.
pub fn first_match(places: &[NominatimPlace]) -> Option<GeoMatch> {
    places.first().and_then(NominatimPlace::to_match)
}

/// Geocoder backed by a Nominatim-compatible search API.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    /// Base URL without the `/search` suffix
    base_url: String,
    /// User agent sent with every request
    user_agent: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl NominatimGeocoder {
    /// Creates a geocoder for the given base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Sets the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Builds the search URL for a place string.
    pub fn search_url(&self, place: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[("format", "json"), ("q", place), ("limit", "1")],
        )
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new(crate::DEFAULT_NOMINATIM_URL)
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, place: &str) -> Option<GeoMatch> {
        let url = match self.search_url(place) {
            Ok(url) => url,
            Err(e) => {
                warn!(base_url = %self.base_url, error = %e, "Invalid geocoder URL");
                return None;
            }
        };

        debug!(place = %place, "Geocoding place");

        let response = match self
            .http_client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(place = %place, error = %e, "Geocoding request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(place = %place, status = %response.status(), "Geocoder returned error status");
            return None;
        }

        let places: Vec<NominatimPlace> = match response.json().await {
            Ok(places) => places,
            Err(e) => {
                warn!(place = %place, error = %e, "Failed to decode geocoder response");
                return None;
            }
        };

        let result = first_match(&places);
        if result.is_none() {
            debug!(place = %place, "No geocoding match");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_parse_first_match() {
        let body = r#"[
            {"lat": "38.7077507", "lon": "-9.1365919", "display_name": "Lisboa, Portugal"},
            {"lat": "1.0", "lon": "2.0", "display_name": "Elsewhere"}
        ]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(body).unwrap();
        let found = first_match(&places).unwrap();

        assert_eq!(found.lat, 38.7077507);
        assert_eq!(found.lon, -9.1365919);
        assert_eq!(found.display_name, "Lisboa, Portugal");
    }

    #[test]
    fn test_empty_response_has_no_match() {
        let places: Vec<NominatimPlace> = serde_json::from_str("[]").unwrap();
        assert!(first_match(&places).is_none());
    }

    #[test]
    fn test_non_numeric_coordinates_have_no_match() {
        let place = NominatimPlace {
            lat: "north".to_string(),
            lon: "-9.14".to_string(),
            display_name: "Nowhere".to_string(),
        };
        assert!(place.to_match().is_none());
    }

    #[test]
    fn test_search_url_encodes_place() {
        let geocoder = NominatimGeocoder::new("https://geo.example.com/");
        let url = geocoder.search_url("São Paulo, Brazil").unwrap();

        assert_eq!(url.path(), "/search");
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["format"], "json");
        assert_eq!(params["q"], "São Paulo, Brazil");
        assert_eq!(params["limit"], "1");
    }

    #[tokio::test]
    async fn test_geocode_against_stub_server() {
        let seen: Arc<Mutex<Vec<HashMap<String, String>>>> = Arc::default();
        let seen_in_handler = seen.clone();
        let router = Router::new().route(
            "/search",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let seen = seen_in_handler.clone();
                async move {
                    seen.lock().unwrap().push(params);
                    Json(serde_json::json!([
                        {"lat": "38.72", "lon": "-9.14", "display_name": "Lisbon, Portugal"}
                    ]))
                }
            }),
        );
        let base = serve(router).await;

        let geocoder = NominatimGeocoder::new(&base);
        let found = geocoder.geocode("Lisbon, Portugal").await.unwrap();
        assert_eq!(found.lat, 38.72);
        assert_eq!(found.lon, -9.14);

        // Every call is a fresh lookup
        geocoder.geocode("Lisbon, Portugal").await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["q"], "Lisbon, Portugal");
        assert_eq!(seen[0]["limit"], "1");
    }

    #[tokio::test]
    async fn test_error_status_is_no_match() {
        let router = Router::new().route(
            "/search",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = serve(router).await;

        let geocoder = NominatimGeocoder::new(&base);
        assert!(geocoder.geocode("Lisbon, Portugal").await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_no_match() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let geocoder = NominatimGeocoder::new(&format!("http://{}", addr));
        assert!(geocoder.geocode("Lisbon, Portugal").await.is_none());
    }
}
