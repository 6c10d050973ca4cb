//! Cache Store Module
//!
//! Adaptive TTL cache: HashMap storage, lazy and swept expiry, LRU eviction
//! by last access, substring invalidation and hit/miss statistics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::cache::stats::Counters;
use crate::cache::{CacheEntry, CacheStats};
use crate::clock::{SharedClock, SystemClock};
use crate::error::ConfigError;

/// Hits an entry must exceed before its TTL starts growing.
pub const ADAPTIVE_HIT_THRESHOLD: u64 = 5;

/// Factor applied to the TTL of a hot entry on each qualifying hit.
pub const ADAPTIVE_TTL_FACTOR: f64 = 1.5;

/// Upper bound for an adapted TTL, as a multiple of the default TTL.
pub const ADAPTIVE_TTL_CAP: u32 = 2;

// == Cache Config ==
/// Per-domain cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL used when `set` is called without one
    pub default_ttl: Duration,
    /// Maximum number of entries before LRU eviction kicks in
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_size: 100,
        }
    }
}

impl CacheConfig {
    /// Creates a config from a default TTL and capacity.
    pub fn new(default_ttl: Duration, max_size: usize) -> Self {
        Self {
            default_ttl,
            max_size,
        }
    }

    /// Rejects zero capacity and zero TTL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Invalid(
                "max_size must be greater than 0".to_string(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "default_ttl must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// == Adaptive Cache ==
/// Typed TTL cache with adaptive TTL extension and LRU eviction.
///
/// The cache never fails on normal operations: absence and expiry are misses.
pub struct AdaptiveCache<T> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<T>>,
    /// Lifetime counters
    counters: Counters,
    /// Monotonic access sequence used to break recency ties
    seq: u64,
    config: CacheConfig,
    clock: SharedClock,
}

impl<T> std::fmt::Debug for AdaptiveCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveCache")
            .field("len", &self.entries.len())
            .field("counters", &self.counters)
            .field("config", &self.config)
            .finish()
    }
}

impl<T: Clone> AdaptiveCache<T> {
    // == Constructor ==
    /// Creates a cache with the given default TTL and capacity.
    ///
    /// # Panics
    /// Panics if `max_size` is zero or `default_ttl` is zero.
    pub fn new(default_ttl: Duration, max_size: usize) -> Self {
        match Self::with_config(CacheConfig::new(default_ttl, max_size)) {
            Ok(cache) => cache,
            Err(err) => panic!("{err}"),
        }
    }

    /// Creates a cache from a validated config using the system clock.
    pub fn with_config(config: CacheConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a cache reading time from `clock`.
    pub fn with_clock(config: CacheConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            entries: HashMap::new(),
            counters: Counters::default(),
            seq: 0,
            config,
            clock,
        })
    }

    // == Set ==
    /// Stores `value` under `key` with `ttl` (default TTL if `None`).
    ///
    /// Overwriting an existing key resets its timestamp, TTL and hit count
    /// and never evicts. Inserting a new key into a full cache evicts the
    /// least recently accessed entry first.
    pub fn set(&mut self, key: impl Into<String>, value: T, ttl: Option<Duration>) {
        let key = key.into();
        let now = self.clock.now();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_size {
            self.evict_lru();
        }

        let mut entry = CacheEntry::new(value, ttl.unwrap_or(self.config.default_ttl), now);
        entry.access_seq = self.next_seq();
        self.entries.insert(key, entry);
    }

    // == Get ==
    /// Returns the value if present and unexpired.
    ///
    /// A hit bumps the entry's hit count and recency and may extend its TTL;
    /// an expired entry is removed and counted as a miss.
    pub fn get(&mut self, key: &str) -> Option<T> {
        let now = self.clock.now();

        let expired = match self.entries.get(key) {
            None => {
                self.counters.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.entries.remove(key);
            self.counters.misses += 1;
            self.counters.expirations += 1;
            trace!(key, "expired on access");
            return None;
        }

        let seq = self.next_seq();
        let cap = self
            .config
            .default_ttl
            .checked_mul(ADAPTIVE_TTL_CAP)
            .unwrap_or(Duration::MAX);
        let entry = self.entries.get_mut(key)?;
        entry.touch(now, seq);

        if entry.hits > ADAPTIVE_HIT_THRESHOLD && entry.ttl < cap {
            let extended =
                Duration::try_from_secs_f64(entry.ttl.as_secs_f64() * ADAPTIVE_TTL_FACTOR)
                    .unwrap_or(Duration::MAX);
            entry.ttl = extended.min(cap);
            trace!(key, ttl_ms = entry.ttl.as_millis() as u64, "extended hot entry ttl");
        }

        self.counters.hits += 1;
        Some(entry.data.clone())
    }

    // == Has ==
    /// Existence probe with the same expiry semantics as `get`.
    ///
    /// Does not touch counters, recency or TTL; an expired entry is removed.
    pub fn has(&mut self, key: &str) -> bool {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                self.entries.remove(key);
                self.counters.expirations += 1;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    // == Time Remaining ==
    /// Remaining TTL of a live entry.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.ttl_remaining(now))
    }

    // == Invalidate ==
    /// Removes `key` if present. Returns whether an entry was removed.
    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Invalidate By Pattern ==
    /// Removes every entry whose key contains `pattern` as a substring.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_by_pattern(&mut self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.contains(pattern));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(pattern, removed, "invalidated entries by pattern");
        }
        removed
    }

    // == Clear ==
    /// Drops all entries and resets every counter.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.counters = Counters::default();
    }

    // == Stats ==
    /// Returns a snapshot of counters and live entries.
    ///
    /// Entries that have expired but were not yet swept are excluded.
    pub fn get_stats(&self) -> CacheStats {
        let now = self.clock.now();
        CacheStats::collect(
            self.counters,
            self.entries
                .values()
                .filter(|entry| !entry.is_expired(now))
                .map(|entry| (entry.timestamp, entry.ttl)),
        )
    }

    // == Sweep Expired ==
    /// Removes every expired entry regardless of access.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - self.entries.len();
        self.counters.expirations += removed as u64;
        removed
    }

    // == Accessors ==
    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    // == LRU Eviction ==
    /// Scans for the entry with the oldest access and removes it.
    fn evict_lru(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.recency())
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            self.counters.evictions += 1;
            debug!(key = %key, "evicted least recently used entry");
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}
