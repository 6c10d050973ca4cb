//! Integration Tests for cache-aside reads through a resilient executor
//!
//! Drives the registry the way a data service would: cached reads, writes
//! that invalidate, backend change events and an unreliable remote.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_cache::clock::MockClock;
use resilient_cache::notify::MemorySink;
use resilient_cache::resilience::{CircuitBreakerConfig, ConnectivityFlag};
use resilient_cache::{
    fetch_cached, write_and_invalidate, CacheConfig, ChangeEvent, CircuitState, Registry,
    RegistryConfig, RemoteError, ResilienceError, RetryConfig,
};

// == Helper Functions ==

struct Harness {
    registry: Registry,
    clock: MockClock,
    sink: Arc<MemorySink>,
    connectivity: Arc<ConnectivityFlag>,
}

fn harness() -> Harness {
    let clock = MockClock::new();
    let sink = Arc::new(MemorySink::new());
    let connectivity = Arc::new(ConnectivityFlag::default());
    let config = RegistryConfig {
        retry: RetryConfig::default()
            .max_retries(2)
            .base_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(100))
            .max_jitter(Duration::ZERO),
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        },
        ..RegistryConfig::default()
    };
    let registry = Registry::new(
        config,
        sink.clone(),
        connectivity.clone(),
        Arc::new(clock.clone()),
    )
    .unwrap();

    Harness {
        registry,
        clock,
        sink,
        connectivity,
    }
}

fn roster() -> Vec<String> {
    vec!["Ada".to_string(), "Grace".to_string()]
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// == Cache-aside Tests ==

#[tokio::test(start_paused = true)]
async fn test_cached_reads_expire_and_follow_change_events() {
    let h = harness();
    let cache = h
        .registry
        .cache::<Vec<String>>("students", CacheConfig::new(Duration::from_millis(5000), 10))
        .unwrap();
    let executor = h.registry.executor("students").unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let load = {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(roster()) }
        }
    };

    for _ in 0..3 {
        let students = fetch_cached(&cache, "students:all", None, &executor, "load students", load.clone())
            .await
            .unwrap();
        assert_eq!(students, roster());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // TTL elapsed: next read goes back to the remote
    h.clock.advance(Duration::from_millis(5001));
    fetch_cached(&cache, "students:all", None, &executor, "load students", load.clone())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Backend change event drops the domain
    h.registry.bus().publish(ChangeEvent::new("students"));
    settle().await;
    fetch_cached(&cache, "students:all", None, &executor, "load students", load.clone())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let stats = cache.read().await.get_stats();
    assert_eq!(stats.total_hits, 2);
    assert_eq!(stats.total_misses, 3);
    assert_eq!(stats.expirations, 1);

    h.registry.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_write_invalidates_related_reads() {
    let h = harness();
    let cache = h
        .registry
        .cache::<u64>("payments", CacheConfig::default())
        .unwrap();
    let executor = h.registry.executor("payments").unwrap();
    {
        let mut guard = cache.write().await;
        guard.set("payments:student:7", 120, None);
        guard.set("payments:all", 900, None);
        guard.set("students:7", 1, None);
    }

    let receipt = write_and_invalidate(&cache, &["payments"], &executor, "record payment", || async {
        Ok::<_, RemoteError>("rcpt-42")
    })
    .await
    .unwrap();

    assert_eq!(receipt, "rcpt-42");
    let mut guard = cache.write().await;
    assert_eq!(guard.len(), 1);
    assert!(guard.has("students:7"));
    drop(guard);

    h.registry.teardown().await;
}

// == Failure Handling Tests ==

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_then_recovers_through_probe() {
    let h = harness();
    let cache = h
        .registry
        .cache::<Vec<String>>("students", CacheConfig::default())
        .unwrap();
    let executor = h.registry.executor("students").unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let failing = {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<Vec<String>, _>(RemoteError::new("connection refused")) }
        }
    };

    // Three exhausted calls, each attempted max_retries + 1 times
    for _ in 0..3 {
        let result = fetch_cached(&cache, "students:all", None, &executor, "load students", failing.clone()).await;
        assert!(matches!(result, Err(ResilienceError::Exhausted { attempts: 3, .. })));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 9);
    assert_eq!(executor.circuit_state(), CircuitState::Open);
    assert!(h
        .sink
        .titles()
        .contains(&"Service temporarily unavailable".to_string()));

    // Open: rejected without touching the remote
    let rejected = fetch_cached(&cache, "students:all", None, &executor, "load students", failing.clone()).await;
    match rejected {
        Err(err @ ResilienceError::CircuitOpen { .. }) => {
            assert!(err.to_string().contains("try again in 30 seconds"));
        }
        other => panic!("expected CircuitOpen, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 9);

    // Failed probe re-opens
    h.clock.advance(Duration::from_secs(30));
    let probe = fetch_cached(&cache, "students:all", None, &executor, "load students", failing.clone()).await;
    assert!(probe.is_err());
    assert_eq!(executor.circuit_state(), CircuitState::Open);

    // Successful probe closes and populates the cache
    h.clock.advance(Duration::from_secs(30));
    let students = fetch_cached(&cache, "students:all", None, &executor, "load students", || async {
        Ok(roster())
    })
    .await
    .unwrap();
    assert_eq!(students, roster());
    assert_eq!(executor.circuit_state(), CircuitState::Closed);
    assert_eq!(executor.failure_count(), 0);
    assert!(cache.write().await.has("students:all"));

    h.registry.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_not_found_reads_do_not_trip_breaker() {
    let h = harness();
    let cache = h
        .registry
        .cache::<u32>("settings", CacheConfig::default())
        .unwrap();
    let executor = h.registry.executor("settings").unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..10 {
        let counter = calls.clone();
        let result = fetch_cached(&cache, "settings:theme", None, &executor, "load settings", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(RemoteError::with_code("PGRST116", "no rows returned")) }
        })
        .await;
        assert!(matches!(result, Err(ResilienceError::NonRetriable { .. })));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 10);
    assert_eq!(executor.circuit_state(), CircuitState::Closed);
    assert!(h.sink.notifications().is_empty());

    h.registry.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_offline_reads_fail_without_calling_remote() {
    let h = harness();
    let cache = h
        .registry
        .cache::<u32>("payments", CacheConfig::default())
        .unwrap();
    let executor = h.registry.executor("payments").unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let load = {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7u32) }
        }
    };

    h.connectivity.set_online(false);
    let result = fetch_cached(&cache, "payments:total", None, &executor, "load payments", load.clone()).await;
    let err = result.unwrap_err();
    assert!(err.remote().is_some_and(RemoteError::is_offline));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(h.sink.titles().contains(&"Operation failed".to_string()));

    h.connectivity.set_online(true);
    let total = fetch_cached(&cache, "payments:total", None, &executor, "load payments", load.clone())
        .await
        .unwrap();
    assert_eq!(total, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    h.registry.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_teardown_cancels_pending_retries() {
    let h = harness();
    let executor = h.registry.executor("students").unwrap();
    let slow = RetryConfig::default().max_jitter(Duration::ZERO);

    let pending = {
        let executor = executor.clone();
        tokio::spawn(async move {
            executor
                .execute_with("load students", &slow, || async {
                    Err::<(), _>(RemoteError::new("timeout"))
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    h.registry.teardown().await;

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(ResilienceError::Cancelled { .. })));
    assert!(h.registry.circuit_states().is_empty());
}
