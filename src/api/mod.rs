//! API Module
//!
//! HTTP handlers and routing for the diagnostics surface.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Cache statistics and circuit states
//! - `POST /events` - Publish a backend change event
//! - `DELETE /cache/:domain` - Invalidate one cache domain

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
