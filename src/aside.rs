//! Cache-aside helpers composing a cache with a resilient executor.
//!
//! Reads probe the cache and fall back to the remote operation on a miss.
//! Writes go to the remote first and invalidate cached reads on success.
//! Neither path is transactional: two callers missing the same key may both
//! fetch, and the last `set` wins.

use std::future::Future;
use std::time::Duration;

use tracing::trace;

use crate::cache::SharedCache;
use crate::error::{RemoteError, Result};
use crate::resilience::ResilientExecutor;

/// Returns the cached value for `key`, or fetches it through `executor`
/// and caches it with `ttl` (the cache default if `None`).
///
/// The cache lock is not held while the remote operation runs. If the
/// caller stops waiting, the fetch still settles on the executor but its
/// value is not cached.
pub async fn fetch_cached<T, F, Fut>(
    cache: &SharedCache<T>,
    key: &str,
    ttl: Option<Duration>,
    executor: &ResilientExecutor,
    label: &str,
    operation: F,
) -> Result<T>
where
    T: Clone + Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<T, RemoteError>> + Send + 'static,
{
    if let Some(hit) = cache.write().await.get(key) {
        trace!(key, "cache hit");
        return Ok(hit);
    }

    let value = executor.execute(label, operation).await?;
    cache.write().await.set(key, value.clone(), ttl);
    Ok(value)
}

/// Runs a write through `executor` and, if it succeeds, invalidates every
/// cached key containing one of `patterns`.
///
/// A failed write leaves the cache untouched.
pub async fn write_and_invalidate<T, U, F, Fut>(
    cache: &SharedCache<T>,
    patterns: &[&str],
    executor: &ResilientExecutor,
    label: &str,
    operation: F,
) -> Result<U>
where
    T: Clone,
    U: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<U, RemoteError>> + Send + 'static,
{
    let written = executor.execute(label, operation).await?;

    let mut guard = cache.write().await;
    for pattern in patterns {
        guard.invalidate_by_pattern(pattern);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{shared, AdaptiveCache};
    use crate::error::ResilienceError;
    use crate::notify::MemorySink;
    use crate::resilience::RetryConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn executor() -> ResilientExecutor {
        ResilientExecutor::builder("students")
            .retry(
                RetryConfig::default()
                    .base_delay(Duration::from_millis(1))
                    .max_jitter(Duration::ZERO),
            )
            .notifier(Arc::new(MemorySink::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_cached_populates_on_miss() {
        let cache = shared(AdaptiveCache::new(Duration::from_secs(60), 10));
        let exec = executor();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let counter = calls.clone();
            let value = fetch_cached(&cache, "students:all", None, &exec, "load students", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(vec!["Ada".to_string()]) }
            })
            .await
            .unwrap();
            assert_eq!(value, vec!["Ada".to_string()]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.read().await.get_stats();
        assert_eq!(stats.total_misses, 1);
        assert_eq!(stats.total_hits, 2);
    }

    #[tokio::test]
    async fn test_fetch_cached_does_not_cache_failures() {
        let cache = shared(AdaptiveCache::<u32>::new(Duration::from_secs(60), 10));
        let exec = executor();

        let result = fetch_cached(&cache, "settings", None, &exec, "load settings", || async {
            Err(RemoteError::new("Settings not found"))
        })
        .await;

        assert!(matches!(result, Err(ResilienceError::NonRetriable { .. })));
        assert!(cache.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_write_and_invalidate() {
        let cache = shared(AdaptiveCache::new(Duration::from_secs(60), 10));
        {
            let mut guard = cache.write().await;
            guard.set("students:all", 1u32, None);
            guard.set("students:7", 2u32, None);
            guard.set("payments:all", 3u32, None);
        }
        let exec = executor();

        let id = write_and_invalidate(&cache, &["students"], &exec, "save student", || async {
            Ok::<_, RemoteError>(7u64)
        })
        .await
        .unwrap();

        assert_eq!(id, 7);
        let mut guard = cache.write().await;
        assert!(!guard.has("students:all"));
        assert!(!guard.has("students:7"));
        assert!(guard.has("payments:all"));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache() {
        let cache = shared(AdaptiveCache::new(Duration::from_secs(60), 10));
        cache.write().await.set("students:all", 1u32, None);
        let exec = executor();

        let result: Result<()> =
            write_and_invalidate(&cache, &["students"], &exec, "save student", || async {
                Err(RemoteError::with_code("403", "forbidden"))
            })
            .await;

        assert!(result.is_err());
        assert!(cache.write().await.has("students:all"));
    }
}
