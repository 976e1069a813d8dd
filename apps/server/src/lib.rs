//! Network Map server library
//!
//! This module exposes the server components for use by the binary and for
//! testing.

pub mod api;
pub mod auth_routes;
pub mod config;
pub mod controller;
pub mod map_view;
pub mod sse;
pub mod state;

use axum::{
    response::Html,
    routing::{get, post},
    Router,
};

pub use config::{BackendConfig, ServerConfig};
pub use controller::{AddOutcome, ContactListController, ControllerEvent};
pub use state::AppState;

/// The single page that renders the form, the recent list and the map
const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/state", get(api::get_state))
        .route("/api/contacts", get(api::list_contacts).post(api::add_contact))
        .route("/api/map", get(api::get_map))
        .route("/events", get(sse::handle_sse))
        .route("/auth/status", get(auth_routes::auth_status))
        .route("/auth/sign-in", post(auth_routes::sign_in))
        .route("/auth/sign-up", post(auth_routes::sign_up))
        .route("/auth/sign-out", post(auth_routes::sign_out))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
