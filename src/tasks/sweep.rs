//! TTL Sweep Task
//!
//! Background task that periodically removes expired cache entries, so keys
//! written once and never read again do not linger.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::SharedCache;

/// Sweep period used when none is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawns a task that sweeps `cache` every `interval` until `shutdown` is cancelled.
///
/// # Example
/// ```ignore
/// let cache = shared(AdaptiveCache::new(Duration::from_secs(300), 100));
/// let token = CancellationToken::new();
/// let handle = spawn_sweep_task("students", cache.clone(), DEFAULT_SWEEP_INTERVAL, token.clone());
/// // Later, during teardown:
/// token.cancel();
/// ```
pub fn spawn_sweep_task<T>(
    domain: impl Into<String>,
    cache: SharedCache<T>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
{
    let domain = domain.into();

    tokio::spawn(async move {
        info!(
            domain = %domain,
            interval_secs = interval.as_secs(),
            "starting TTL sweep task"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(domain = %domain, "TTL sweep task stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let removed = cache.write().await.sweep_expired();

            if removed > 0 {
                info!(domain = %domain, removed, "TTL sweep removed expired entries");
            } else {
                debug!(domain = %domain, "TTL sweep found no expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{shared, AdaptiveCache, CacheConfig};
    use crate::clock::MockClock;
    use std::sync::Arc;

    fn mock_cache() -> (SharedCache<String>, MockClock) {
        let clock = MockClock::new();
        let cache = AdaptiveCache::with_clock(
            CacheConfig::new(Duration::from_secs(300), 100),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (shared(cache), clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_removes_expired_entries() {
        let (cache, clock) = mock_cache();
        cache
            .write()
            .await
            .set("expire_soon", "value".to_string(), Some(Duration::from_secs(1)));

        let token = CancellationToken::new();
        let handle = spawn_sweep_task("test", cache.clone(), Duration::from_secs(1), token.clone());

        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // Removed by the sweep, not by a lazy read
        assert_eq!(cache.read().await.len(), 0);
        assert_eq!(cache.read().await.get_stats().expirations, 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_preserves_valid_entries() {
        let (cache, _clock) = mock_cache();
        cache
            .write()
            .await
            .set("long_lived", "value".to_string(), Some(Duration::from_secs(3600)));

        let token = CancellationToken::new();
        let handle = spawn_sweep_task("test", cache.clone(), Duration::from_secs(1), token.clone());

        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(cache.write().await.get("long_lived"), Some("value".to_string()));

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_task_stops_on_cancel() {
        let (cache, _clock) = mock_cache();
        let token = CancellationToken::new();

        let handle = spawn_sweep_task("test", cache, Duration::from_secs(60), token.clone());
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should finish after cancel")
            .unwrap();
    }
}
