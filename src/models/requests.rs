//! Request DTOs for the diagnostics API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::events::ChangeEvent;

/// Maximum accepted length of a domain name.
pub const MAX_DOMAIN_LENGTH: usize = 128;

/// Request body for POST /events
///
/// # Fields
/// - `domain`: table or domain whose data changed on the backend
#[derive(Debug, Clone, Deserialize)]
pub struct PublishEventRequest {
    pub domain: String,
}

impl PublishEventRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.domain.trim().is_empty() {
            return Some("Domain cannot be empty".to_string());
        }
        if self.domain.len() > MAX_DOMAIN_LENGTH {
            return Some(format!(
                "Domain exceeds maximum length of {} characters",
                MAX_DOMAIN_LENGTH
            ));
        }
        None
    }

    pub fn into_event(self) -> ChangeEvent {
        ChangeEvent::new(self.domain.trim())
    }
}
