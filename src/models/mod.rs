//! Diagnostics API models
//!
//! Bodies accepted and returned by the HTTP surface.

pub mod requests;
pub mod responses;

pub use requests::PublishEventRequest;
pub use responses::{
    CircuitStatusResponse, DomainStatsResponse, ErrorResponse, HealthResponse,
    InvalidateResponse, PublishResponse, StatsResponse,
};
