//! Server-Sent Events (SSE) change feed
//!
//! `GET /events` streams a `change` event whenever the controller's state
//! changes. The payload carries the collection revision so the page can tell
//! a marker change (new revision) from a status-only change.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures_util::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::{controller::ControllerEvent, state::AppState};

/// SSE event name used for state changes
pub const CHANGE_EVENT: &str = "change";

fn change_event(event: &ControllerEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(CHANGE_EVENT).data(json)),
        Err(e) => {
            warn!("Failed to serialize change event: {}", e);
            None
        }
    }
}

/// SSE endpoint for subscribing to state changes
///
/// GET /events
pub async fn handle_sse(State(state): State<AppState>) -> impl IntoResponse {
    debug!("SSE client connected");

    let controller = state.controller.clone();
    let mut stream = BroadcastStream::new(controller.subscribe());

    let stream = async_stream::stream! {
        // Start every client from the current revision
        let current = ControllerEvent::Changed { revision: controller.revision().await };
        if let Some(event) = change_event(&current) {
            yield Ok::<_, Infallible>(event);
        }

        while let Some(result) = stream.next().await {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    // Missed events: send the latest state instead
                    debug!("Change feed receiver lagged: {}", e);
                    ControllerEvent::Changed { revision: controller.revision().await }
                }
            };
            if let Some(event) = change_event(&event) {
                yield Ok::<_, Infallible>(event);
            }
        }

        debug!("Change feed ended");
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
