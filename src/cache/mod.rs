//! Cache Module
//!
//! Provides typed in-memory caching with adaptive TTL, LRU eviction and
//! substring invalidation.

mod entry;
mod stats;
mod store;


use std::sync::Arc;

use tokio::sync::RwLock;

// Re-export public types
pub use entry::CacheEntry;
pub use stats::{hit_rate, CacheStats};
pub use store::{
    AdaptiveCache, CacheConfig, ADAPTIVE_HIT_THRESHOLD, ADAPTIVE_TTL_CAP, ADAPTIVE_TTL_FACTOR,
};

/// Cache handle shared between callers and background tasks.
///
/// `get` needs the write lock since hits update recency and TTL.
pub type SharedCache<T> = Arc<RwLock<AdaptiveCache<T>>>;

/// Wraps a cache for sharing.
pub fn shared<T>(cache: AdaptiveCache<T>) -> SharedCache<T> {
    Arc::new(RwLock::new(cache))
}
