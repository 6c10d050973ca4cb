//! Response DTOs for the diagnostics API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::time::Instant;

use serde::Serialize;

use crate::cache::CacheStats;
use crate::resilience::CircuitState;

/// Per-domain cache statistics (GET /stats)
///
/// Instants are reported as ages in milliseconds relative to the request.
#[derive(Debug, Clone, Serialize)]
pub struct DomainStatsResponse {
    pub domain: String,
    pub total_entries: usize,
    pub total_hits: u64,
    pub total_misses: u64,
    /// Hit rate in percent
    pub hit_rate: f64,
    pub avg_ttl_ms: u64,
    pub oldest_entry_age_ms: Option<u64>,
    pub newest_entry_age_ms: Option<u64>,
    pub evictions: u64,
    pub expirations: u64,
}

impl DomainStatsResponse {
    /// Converts a stats snapshot taken before `now`.
    pub fn new(domain: impl Into<String>, stats: &CacheStats, now: Instant) -> Self {
        let age_ms = |at: Instant| now.saturating_duration_since(at).as_millis() as u64;
        Self {
            domain: domain.into(),
            total_entries: stats.total_entries,
            total_hits: stats.total_hits,
            total_misses: stats.total_misses,
            hit_rate: stats.hit_rate,
            avg_ttl_ms: stats.avg_ttl.as_millis() as u64,
            oldest_entry_age_ms: stats.oldest_entry.map(age_ms),
            newest_entry_age_ms: stats.newest_entry.map(age_ms),
            evictions: stats.evictions,
            expirations: stats.expirations,
        }
    }
}

/// Circuit breaker status of one operation class (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatusResponse {
    pub class: String,
    pub state: CircuitState,
    pub failure_count: u32,
}

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub caches: Vec<DomainStatsResponse>,
    pub circuits: Vec<CircuitStatusResponse>,
}

/// Response body for POST /events
#[derive(Debug, Clone, Serialize)]
pub struct PublishResponse {
    pub message: String,
    pub domain: String,
    /// Number of listening caches the event reached
    pub receivers: usize,
}

impl PublishResponse {
    pub fn new(domain: impl Into<String>, receivers: usize) -> Self {
        let domain = domain.into();
        Self {
            message: format!("Change event for '{}' published", domain),
            domain,
            receivers,
        }
    }
}

/// Response body for DELETE /cache/:domain
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    pub domain: String,
    pub removed: usize,
}

impl InvalidateResponse {
    pub fn new(domain: impl Into<String>, removed: usize) -> Self {
        let domain = domain.into();
        Self {
            message: format!("Cache '{}' invalidated", domain),
            domain,
            removed,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
