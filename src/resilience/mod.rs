//! Resilience Module
//!
//! Protects callers from an unreliable backend.
//!
//! # Data Flow
//! ```text
//! Remote call:
//!     → circuit_breaker.rs (reject locally while open)
//!     → retry.rs           (classify error, back off with jitter)
//!     → connectivity.rs    (fail fast while offline)
//! ```

mod circuit_breaker;
mod connectivity;
mod executor;
mod retry;

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use connectivity::{AlwaysOnline, Connectivity, ConnectivityFlag};
pub use executor::{IntoResilienceError, ResilientExecutor, ResilientExecutorBuilder};
pub use retry::{is_non_retriable, RetryConfig};
