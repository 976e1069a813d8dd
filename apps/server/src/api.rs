//! Contact and map route handlers
//!
//! - `GET /api/state` - form, status and recent contacts
//! - `GET /api/contacts` - the whole collection, newest first
//! - `POST /api/contacts` - add a contact
//! - `GET /api/map` - map snapshot with one marker per contact

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use entities::{Contact, ContactDraft};
use serde::Serialize;

use crate::{
    controller::{AddOutcome, ViewState},
    map_view::MapSnapshot,
    state::AppState,
};

/// Response to an add-contact request
#[derive(Debug, Serialize)]
pub struct AddContactResponse {
    /// Outcome name (e.g. "added", "not_found")
    pub outcome: &'static str,

    /// The stored contact, when it was added to the current collection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,

    /// State after the attempt
    pub state: ViewState,
}

fn outcome_status(outcome: &AddOutcome) -> (StatusCode, &'static str) {
    match outcome {
        AddOutcome::Added(_) => (StatusCode::CREATED, "added"),
        AddOutcome::Invalid => (StatusCode::UNPROCESSABLE_ENTITY, "invalid"),
        AddOutcome::SignInRequired => (StatusCode::UNAUTHORIZED, "sign_in_required"),
        AddOutcome::Busy => (StatusCode::CONFLICT, "busy"),
        AddOutcome::NotFound => (StatusCode::UNPROCESSABLE_ENTITY, "not_found"),
        AddOutcome::Failed(_) => (StatusCode::BAD_GATEWAY, "failed"),
        AddOutcome::SessionChanged(_) => (StatusCode::CONFLICT, "session_changed"),
    }
}

/// Current view state
pub async fn get_state(State(state): State<AppState>) -> Json<ViewState> {
    Json(state.controller.view_state().await)
}

/// All contacts, newest first
pub async fn list_contacts(State(state): State<AppState>) -> Json<Vec<Contact>> {
    Json(state.controller.contacts().await)
}

/// Add a contact from form input
pub async fn add_contact(
    State(state): State<AppState>,
    Json(draft): Json<ContactDraft>,
) -> impl IntoResponse {
    let outcome = state.controller.add_contact(draft).await;
    let (status, name) = outcome_status(&outcome);
    let contact = match outcome {
        AddOutcome::Added(contact) => Some(contact),
        _ => None,
    };

    let body = AddContactResponse {
        outcome: name,
        contact,
        state: state.controller.view_state().await,
    };
    (status, Json(body))
}

/// Map snapshot
pub async fn get_map(State(state): State<AppState>) -> Json<MapSnapshot> {
    let (contacts, revision) = state.controller.contacts_with_revision().await;
    Json(MapSnapshot::new(&contacts, revision))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use contact_store::MemoryContactStore;
    use geocoding::{GeoMatch, Geocoder};
    use serde_json::{json, Value as JsonValue};
    use tower::ServiceExt;

    use super::*;
    use crate::{build_router, config::ServerConfig};

    struct LisbonOnly;

    #[async_trait]
    impl Geocoder for LisbonOnly {
        async fn geocode(&self, place: &str) -> Option<GeoMatch> {
            (place == "Lisbon, Portugal").then(|| GeoMatch {
                lat: 38.72,
                lon: -9.14,
                display_name: "Lisboa, Portugal".to_string(),
            })
        }
    }

    fn app() -> axum::Router {
        let state = AppState::from_parts(
            Arc::new(MemoryContactStore::new()),
            Arc::new(LisbonOnly),
            None,
            ServerConfig::default(),
        );
        build_router(state)
    }

    async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, JsonValue) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_contact(body: JsonValue) -> Request<Body> {
        Request::post("/api/contacts")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_contact_then_map() {
        let app = app();

        let (status, body) = send(
            &app,
            post_contact(json!({
                "name": "Jordan Lee",
                "city": "Lisbon",
                "country": "Portugal",
                "note": "Met at Web Summit"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["outcome"], "added");
        assert_eq!(body["state"]["status"], "Added Jordan Lee in Lisbon.");
        assert_eq!(body["state"]["totalCount"], 1);

        let (status, map) = send(&app, Request::get("/api/map").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(map["markers"][0]["position"], json!([38.72, -9.14]));
        assert_eq!(map["markers"][0]["popup"]["location"], "Lisbon, Portugal");
        assert_eq!(map["revision"], 1);
    }

    #[tokio::test]
    async fn test_rejected_attempts() {
        let app = app();

        let (status, body) = send(&app, post_contact(json!({"name": "Jordan Lee"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["outcome"], "invalid");

        let (status, body) = send(
            &app,
            post_contact(json!({"name": "Sam", "city": "Atlantis", "country": "Nowhere"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["outcome"], "not_found");

        let (_, contacts) =
            send(&app, Request::get("/api/contacts").body(Body::empty()).unwrap()).await;
        assert_eq!(contacts, json!([]));
    }

    #[test]
    fn test_session_change_is_not_reported_as_added() {
        let contact = Contact::from_new(
            ContactDraft::new("Jordan Lee", "Lisbon", "Portugal", "")
                .validate()
                .unwrap()
                .with_coordinates(38.72, -9.14),
        );
        assert_eq!(
            outcome_status(&AddOutcome::SessionChanged(contact)),
            (StatusCode::CONFLICT, "session_changed")
        );
    }

    #[tokio::test]
    async fn test_state_in_local_mode() {
        let (status, body) =
            send(&app(), Request::get("/api/state").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "local");
        assert_eq!(body["requiresAuth"], false);
        assert_eq!(body["recent"], json!([]));
    }
}
