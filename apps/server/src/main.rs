//! Network Map Server
//!
//! The server handles:
//! - Recording contacts and geocoding where they were met
//! - Serving the map page and its JSON projection
//! - Email/password accounts (when a hosted backend is configured)

use axum::http::HeaderValue;
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use network_map_server::{build_router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ServerConfig::load()?;

    // Initialize tracing
    let log_level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "network_map_server={level},auth={level},contact_store={level},geocoding={level},tower_http=debug",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let backend = config.backend();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = backend.mode(),
        "Starting Network Map Server"
    );
    if config.has_partial_backend() {
        warn!("Only one of the backend URL and API key is set, running in local mode");
    }

    // Initialize application state
    let state = AppState::new(config.clone()).await?;

    // Follow the session and keep it fresh (remote mode)
    let mut background = Vec::new();
    if let Some(session) = &state.session {
        if let Some(listener) = state.controller.clone().spawn_session_listener() {
            background.push(listener);
        }
        background.push(session.clone().spawn_restore_task());
        background.push(session.clone().spawn_refresh_task());
    }

    // Initial load (the listener already reloads after a restored sign-in)
    if !backend.requires_auth() {
        if let Err(e) = state.controller.reload().await {
            warn!(error = %e, "Initial contact load failed");
        }
    }

    // Build CORS layer
    let cors = if config.enable_cors {
        let origins = config
            .cors_origins
            .iter()
            .map(|s| s.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    // Build router
    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Bind and serve
    let listener = TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in background {
        task.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
