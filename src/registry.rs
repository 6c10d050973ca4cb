//! Registry Module
//!
//! Owns the process-wide instances: one typed cache per data domain and one
//! executor per operation class. Built explicitly and passed around; there
//! is no global state. `teardown` stops every background task and empties
//! the registry.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{shared, AdaptiveCache, CacheConfig, CacheStats, SharedCache};
use crate::clock::{SharedClock, SystemClock};
use crate::error::ConfigError;
use crate::events::{ChangeBus, DEFAULT_BUS_CAPACITY};
use crate::notify::{NotificationSink, TracingSink};
use crate::resilience::{
    AlwaysOnline, CircuitBreakerConfig, CircuitState, Connectivity, ResilientExecutor,
    RetryConfig,
};
use crate::tasks::{spawn_invalidation_listener, spawn_sweep_task, DEFAULT_SWEEP_INTERVAL};

// == Registry Config ==
/// Settings shared by everything the registry creates.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    pub sweep_interval: Duration,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub bus_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sweep_interval must be greater than 0".to_string(),
            ));
        }
        self.retry.validate()?;
        self.circuit_breaker.validate()
    }
}

// == Type-erased Domain ==
/// Value-type independent view of a registered cache.
#[async_trait]
trait DomainCache: Send + Sync {
    async fn stats(&self) -> CacheStats;
    async fn invalidate_all(&self) -> usize;
    async fn clear(&self);
    fn as_any(&self) -> &dyn Any;
}

struct TypedDomain<T> {
    cache: SharedCache<T>,
}

#[async_trait]
impl<T> DomainCache for TypedDomain<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn stats(&self) -> CacheStats {
        self.cache.read().await.get_stats()
    }

    async fn invalidate_all(&self) -> usize {
        // Every key contains the empty string
        self.cache.write().await.invalidate_by_pattern("")
    }

    async fn clear(&self) {
        self.cache.write().await.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// == Registry ==
pub struct Registry {
    config: RegistryConfig,
    notifier: Arc<dyn NotificationSink>,
    connectivity: Arc<dyn Connectivity>,
    clock: SharedClock,
    bus: ChangeBus,
    caches: Mutex<HashMap<String, Arc<dyn DomainCache>>>,
    executors: Mutex<HashMap<String, Arc<ResilientExecutor>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Mutex<CancellationToken>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("domains", &self.domains())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Registry {
    /// Creates a registry with explicit collaborators.
    pub fn new(
        config: RegistryConfig,
        notifier: Arc<dyn NotificationSink>,
        connectivity: Arc<dyn Connectivity>,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            bus: ChangeBus::new(config.bus_capacity),
            config,
            notifier,
            connectivity,
            clock,
            caches: Mutex::new(HashMap::new()),
            executors: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            shutdown: Mutex::new(CancellationToken::new()),
        })
    }

    /// Registry logging notifications, always online, on the system clock.
    pub fn with_defaults(config: RegistryConfig) -> Result<Self, ConfigError> {
        Self::new(
            config,
            Arc::new(TracingSink),
            Arc::new(AlwaysOnline),
            Arc::new(SystemClock),
        )
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Current time on the registry's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// The change-event bus every registered cache listens to.
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    // == Caches ==
    /// Returns the cache for `domain`, creating it on first use.
    ///
    /// Creation spawns the sweep task and the change-event listener, so it
    /// must run inside a tokio runtime. `config` is ignored when the domain
    /// already exists.
    pub fn cache<T>(&self, domain: &str, config: CacheConfig) -> Result<SharedCache<T>, ConfigError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut caches = lock(&self.caches);

        if let Some(existing) = caches.get(domain) {
            return existing
                .as_any()
                .downcast_ref::<TypedDomain<T>>()
                .map(|typed| typed.cache.clone())
                .ok_or_else(|| ConfigError::DomainTypeMismatch(domain.to_string()));
        }

        let cache = shared(AdaptiveCache::with_clock(config, self.clock.clone())?);
        let token = lock(&self.shutdown).child_token();

        let sweep = spawn_sweep_task(
            domain,
            cache.clone(),
            self.config.sweep_interval,
            token.clone(),
        );
        let listener =
            spawn_invalidation_listener(domain, cache.clone(), self.bus.subscribe(), token);
        lock(&self.tasks).extend([sweep, listener]);

        caches.insert(
            domain.to_string(),
            Arc::new(TypedDomain {
                cache: cache.clone(),
            }),
        );
        info!(domain, "cache registered");
        Ok(cache)
    }

    /// Registered domain names, sorted.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = lock(&self.caches).keys().cloned().collect();
        domains.sort();
        domains
    }

    /// Stats for every registered cache, sorted by domain.
    pub async fn domain_stats(&self) -> Vec<(String, CacheStats)> {
        let domains = self.snapshot_caches();
        let mut stats = Vec::with_capacity(domains.len());
        for (domain, cache) in domains {
            stats.push((domain, cache.stats().await));
        }
        stats
    }

    /// Drops every entry of `domain`. Returns `None` if the domain is unknown.
    pub async fn invalidate_domain(&self, domain: &str) -> Option<usize> {
        let cache = {
            let caches = lock(&self.caches);
            caches.get(domain).cloned()
        }?;
        let removed = cache.invalidate_all().await;
        debug!(domain, removed, "domain invalidated");
        Some(removed)
    }

    fn snapshot_caches(&self) -> Vec<(String, Arc<dyn DomainCache>)> {
        let mut domains: Vec<(String, Arc<dyn DomainCache>)> = lock(&self.caches)
            .iter()
            .map(|(domain, cache)| (domain.clone(), cache.clone()))
            .collect();
        domains.sort_by(|a, b| a.0.cmp(&b.0));
        domains
    }

    // == Executors ==
    /// Returns the executor for operation class `class`, creating it on first use.
    pub fn executor(&self, class: &str) -> Result<Arc<ResilientExecutor>, ConfigError> {
        let mut executors = lock(&self.executors);
        if let Some(existing) = executors.get(class) {
            return Ok(existing.clone());
        }

        let executor = Arc::new(
            ResilientExecutor::builder(class)
                .retry(self.config.retry.clone())
                .circuit_breaker(self.config.circuit_breaker.clone())
                .notifier(self.notifier.clone())
                .connectivity(self.connectivity.clone())
                .clock(self.clock.clone())
                .build()?,
        );
        executors.insert(class.to_string(), executor.clone());
        debug!(class, "executor registered");
        Ok(executor)
    }

    /// Circuit state and consecutive failures per operation class, sorted.
    pub fn circuit_states(&self) -> Vec<(String, CircuitState, u32)> {
        let mut states: Vec<(String, CircuitState, u32)> = lock(&self.executors)
            .iter()
            .map(|(class, executor)| {
                (
                    class.clone(),
                    executor.circuit_state(),
                    executor.failure_count(),
                )
            })
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    // == Teardown ==
    /// Stops background tasks, cancels pending retries, clears every cache
    /// and forgets all registered instances.
    ///
    /// Handles obtained earlier stay usable but are no longer swept or
    /// invalidated by change events.
    pub async fn teardown(&self) {
        {
            let mut shutdown = lock(&self.shutdown);
            shutdown.cancel();
            *shutdown = CancellationToken::new();
        }

        let tasks: Vec<JoinHandle<()>> = lock(&self.tasks).drain(..).collect();
        for task in tasks {
            // Tasks exit on cancellation; a join error only means one panicked
            let _ = task.await;
        }

        let executors: Vec<Arc<ResilientExecutor>> =
            lock(&self.executors).drain().map(|(_, e)| e).collect();
        for executor in &executors {
            executor.cleanup();
        }

        let caches: Vec<Arc<dyn DomainCache>> =
            lock(&self.caches).drain().map(|(_, c)| c).collect();
        for cache in &caches {
            cache.clear().await;
        }

        info!(
            caches = caches.len(),
            executors = executors.len(),
            "registry torn down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeEvent;
    use tokio_test::assert_err;

    fn registry() -> Registry {
        Registry::with_defaults(RegistryConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RegistryConfig {
            sweep_interval: Duration::ZERO,
            ..RegistryConfig::default()
        };
        assert_err!(Registry::with_defaults(config));
    }

    #[tokio::test]
    async fn test_cache_is_shared_per_domain() {
        let registry = registry();

        let first = registry
            .cache::<String>("students", CacheConfig::default())
            .unwrap();
        first.write().await.set("students:1", "Ada".to_string(), None);

        let second = registry
            .cache::<String>("students", CacheConfig::default())
            .unwrap();
        assert_eq!(
            second.write().await.get("students:1"),
            Some("Ada".to_string())
        );
        assert_eq!(registry.domains(), vec!["students"]);

        registry.teardown().await;
    }

    #[tokio::test]
    async fn test_domain_type_mismatch() {
        let registry = registry();
        registry
            .cache::<String>("students", CacheConfig::default())
            .unwrap();

        let result = registry.cache::<u64>("students", CacheConfig::default());
        assert!(matches!(result, Err(ConfigError::DomainTypeMismatch(_))));

        registry.teardown().await;
    }

    #[tokio::test]
    async fn test_executor_is_shared_per_class() {
        let registry = registry();
        let a = registry.executor("payments").unwrap();
        let b = registry.executor("payments").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let states = registry.circuit_states();
        assert_eq!(states, vec![("payments".to_string(), CircuitState::Closed, 0)]);
    }

    #[tokio::test]
    async fn test_bus_events_invalidate_registered_cache() {
        let registry = registry();
        let cache = registry
            .cache::<u32>("payments", CacheConfig::default())
            .unwrap();
        cache.write().await.set("payments:all", 1, None);

        registry.bus().publish(ChangeEvent::new("payments"));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(!cache.write().await.has("payments:all"));
        registry.teardown().await;
    }

    #[tokio::test]
    async fn test_invalidate_domain_and_stats() {
        let registry = registry();
        let cache = registry
            .cache::<u32>("students", CacheConfig::default())
            .unwrap();
        {
            let mut guard = cache.write().await;
            guard.set("a", 1, None);
            guard.set("b", 2, None);
            guard.get("a");
        }

        let stats = registry.domain_stats().await;
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].1.total_entries, 2);
        assert_eq!(stats[0].1.total_hits, 1);

        assert_eq!(registry.invalidate_domain("students").await, Some(2));
        assert_eq!(registry.invalidate_domain("unknown").await, None);

        registry.teardown().await;
    }

    #[tokio::test]
    async fn test_teardown_empties_registry() {
        let registry = registry();
        let cache = registry
            .cache::<u32>("students", CacheConfig::default())
            .unwrap();
        cache.write().await.set("a", 1, None);
        registry.executor("students").unwrap();

        registry.teardown().await;

        assert!(registry.domains().is_empty());
        assert!(registry.circuit_states().is_empty());
        assert!(cache.read().await.is_empty());
        assert_eq!(registry.bus().subscriber_count(), 0);

        // Usable again after teardown
        registry
            .cache::<u32>("students", CacheConfig::default())
            .unwrap();
        registry.teardown().await;
    }
}
