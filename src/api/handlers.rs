//! API Handlers
//!
//! HTTP request handlers for the diagnostics and change-event endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::error::ApiError;
use crate::models::{
    CircuitStatusResponse, DomainStatsResponse, HealthResponse, InvalidateResponse,
    PublishEventRequest, PublishResponse, StatsResponse,
};
use crate::registry::Registry;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

/// Handler for GET /stats
///
/// Reports every registered cache and every operation class's circuit.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let registry = &state.registry;
    let now = registry.now();

    let caches = registry
        .domain_stats()
        .await
        .into_iter()
        .map(|(domain, stats)| DomainStatsResponse::new(domain, &stats, now))
        .collect();

    let circuits = registry
        .circuit_states()
        .into_iter()
        .map(|(class, state, failure_count)| CircuitStatusResponse {
            class,
            state,
            failure_count,
        })
        .collect();

    Json(StatsResponse { caches, circuits })
}

/// Handler for POST /events
///
/// Publishes a change event on the registry's bus.
pub async fn publish_event_handler(
    State(state): State<AppState>,
    Json(req): Json<PublishEventRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let event = req.into_event();
    let domain = event.domain.clone();
    let receivers = state.registry.bus().publish(event);
    info!(domain = %domain, receivers, "change event received");

    Ok(Json(PublishResponse::new(domain, receivers)))
}

/// Handler for DELETE /cache/:domain
pub async fn invalidate_domain_handler(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let removed = state
        .registry
        .invalidate_domain(&domain)
        .await
        .ok_or_else(|| ApiError::UnknownDomain(domain.clone()))?;

    Ok(Json(InvalidateResponse::new(domain, removed)))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
