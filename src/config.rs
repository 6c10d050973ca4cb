//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::error::ConfigError;
use crate::registry::RegistryConfig;
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Default TTL in milliseconds for caches created at startup
    pub default_ttl_ms: u64,
    /// Maximum number of entries per cache
    pub max_entries: usize,
    /// Background sweep interval in seconds
    pub sweep_interval_secs: u64,
    /// Cache domains registered at startup
    pub domains: Vec<String>,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_jitter_ms: u64,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL_MS` (default: 300000)
    /// - `CACHE_MAX_ENTRIES` (default: 100)
    /// - `CACHE_SWEEP_INTERVAL_SECS` (default: 60)
    /// - `CACHE_DOMAINS` comma-separated (default: students,payments)
    /// - `RETRY_MAX_RETRIES` (default: 3)
    /// - `RETRY_BASE_DELAY_MS` (default: 1000)
    /// - `RETRY_MAX_DELAY_MS` (default: 10000)
    /// - `RETRY_BACKOFF_MULTIPLIER` (default: 2.0)
    /// - `RETRY_MAX_JITTER_MS` (default: 1000)
    /// - `BREAKER_FAILURE_THRESHOLD` (default: 5)
    /// - `BREAKER_COOLDOWN_MS` (default: 30000)
    /// - `SERVER_PORT` (default: 3000)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a Config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str, default| parse_or(lookup(key), default);

        Self {
            default_ttl_ms: parsed("CACHE_DEFAULT_TTL_MS", defaults.default_ttl_ms),
            max_entries: parse_or(lookup("CACHE_MAX_ENTRIES"), defaults.max_entries),
            sweep_interval_secs: parsed("CACHE_SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            domains: lookup("CACHE_DOMAINS")
                .map(|raw| split_domains(&raw))
                .unwrap_or(defaults.domains),
            max_retries: parse_or(lookup("RETRY_MAX_RETRIES"), defaults.max_retries),
            base_delay_ms: parsed("RETRY_BASE_DELAY_MS", defaults.base_delay_ms),
            max_delay_ms: parsed("RETRY_MAX_DELAY_MS", defaults.max_delay_ms),
            backoff_multiplier: parse_or(
                lookup("RETRY_BACKOFF_MULTIPLIER"),
                defaults.backoff_multiplier,
            ),
            max_jitter_ms: parsed("RETRY_MAX_JITTER_MS", defaults.max_jitter_ms),
            failure_threshold: parse_or(
                lookup("BREAKER_FAILURE_THRESHOLD"),
                defaults.failure_threshold,
            ),
            cooldown_ms: parsed("BREAKER_COOLDOWN_MS", defaults.cooldown_ms),
            server_port: parse_or(lookup("SERVER_PORT"), defaults.server_port),
        }
    }

    /// Per-cache settings for the startup domains.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(Duration::from_millis(self.default_ttl_ms), self.max_entries)
    }

    /// Retry and breaker settings shared by the registry's executors.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            retry: RetryConfig::default()
                .max_retries(self.max_retries)
                .base_delay(Duration::from_millis(self.base_delay_ms))
                .max_delay(Duration::from_millis(self.max_delay_ms))
                .backoff_multiplier(self.backoff_multiplier)
                .max_jitter(Duration::from_millis(self.max_jitter_ms)),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: self.failure_threshold,
                cooldown: Duration::from_millis(self.cooldown_ms),
            },
            ..RegistryConfig::default()
        }
    }

    /// Checks every derived config before anything is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domains.is_empty() {
            return Err(ConfigError::Invalid(
                "CACHE_DOMAINS must name at least one domain".to_string(),
            ));
        }
        self.cache_config().validate()?;
        self.registry_config().validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl_ms: 300_000,
            max_entries: 100,
            sweep_interval_secs: 60,
            domains: vec!["students".to_string(), "payments".to_string()],
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            max_jitter_ms: 1000,
            failure_threshold: 5,
            cooldown_ms: 30_000,
            server_port: 3000,
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn split_domains(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}
