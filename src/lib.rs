//! Resilient Cache - client-side caching and fault tolerance for remote data
//!
//! Provides an adaptive TTL/LRU cache and an executor that wraps remote
//! operations with retry, exponential backoff and a circuit breaker.

pub mod api;
pub mod aside;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod notify;
pub mod registry;
pub mod resilience;
pub mod tasks;

pub use api::AppState;
pub use aside::{fetch_cached, write_and_invalidate};
pub use cache::{AdaptiveCache, CacheConfig, CacheStats, SharedCache};
pub use config::Config;
pub use error::{ConfigError, RemoteError, ResilienceError};
pub use events::{ChangeBus, ChangeEvent};
pub use registry::{Registry, RegistryConfig};
pub use resilience::{CircuitState, ResilientExecutor, RetryConfig};
