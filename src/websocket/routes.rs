use axum::routing::get;
use std::sync::Arc;

use super::handler::{lobby_socket_handler, room_socket_handler};
use super::AppState;

/// Create the Axum router with the socket endpoints and a liveness probe.
pub fn create_router(cors_origins: &str) -> axum::Router<Arc<AppState>> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let cors = if cors_origins == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("No valid CORS origins configured, using permissive CORS");
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    axum::Router::new()
        .route("/ws/rooms/{code}/", get(room_socket_handler))
        .route("/ws/rooms/{code}", get(room_socket_handler))
        .route("/ws/lobby/", get(lobby_socket_handler))
        .route("/ws/lobby", get(lobby_socket_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
