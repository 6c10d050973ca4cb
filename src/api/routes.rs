//! API Routes
//!
//! Configures the Axum router with the diagnostics endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, invalidate_domain_handler, publish_event_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /stats` - Cache statistics and circuit states
/// - `POST /events` - Publish a backend change event
/// - `DELETE /cache/:domain` - Invalidate one cache domain
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/events", post(publish_event_handler))
        .route("/cache/:domain", delete(invalidate_domain_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
