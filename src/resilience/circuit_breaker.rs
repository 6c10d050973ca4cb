//! Circuit breaker guarding one class of remote operations.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: calls are rejected locally until the cooldown elapses
//! - Half-Open: a single probe call is let through
//!
//! # State Transitions
//! ```text
//! Closed    → Open:      consecutive failures reach failure_threshold
//! Open      → Half-Open: first call after cooldown since the last failure
//! Half-Open → Closed:    probe succeeds
//! Half-Open → Open:      probe fails (one failure is enough)
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::error::{ConfigError, ResilienceError};

// == Circuit State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

// == Config ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is allowed
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_millis(30_000),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed, ordinary call
    Normal,
    /// The single half-open trial call
    Probe,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
    /// Set once a rejection during the current open period was reported
    rejection_reported: bool,
}

// == Circuit Breaker ==
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: SharedClock,
    inner: Mutex<BreakerInner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("inner", &*self.lock())
            .finish()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker using the system clock.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                probe_in_flight: false,
                rejection_reported: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // Every update is a plain field store, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failures since the last success.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    // == Admission ==
    /// Decides whether a call for `operation` may proceed.
    ///
    /// In `Open`, the first call after the cooldown moves the breaker to
    /// `HalfOpen` and is admitted as the probe; other calls are rejected
    /// without invoking the operation.
    pub fn acquire(&self, operation: &str) -> Result<Admission, ResilienceError> {
        let now = self.clock.now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::HalfOpen if inner.probe_in_flight => {
                Err(ResilienceError::ProbeInFlight {
                    operation: operation.to_string(),
                })
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Ok(Admission::Probe)
            }
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(self.config.cooldown);

                if elapsed >= self.config.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!(breaker = %self.name, "circuit half-open, allowing probe");
                    Ok(Admission::Probe)
                } else {
                    Err(ResilienceError::CircuitOpen {
                        operation: operation.to_string(),
                        retry_in: self.config.cooldown - elapsed,
                    })
                }
            }
        }
    }

    // == Outcomes ==
    /// Resets the failure counter and closes the circuit.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(breaker = %self.name, "circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.probe_in_flight = false;
        inner.rejection_reported = false;
    }

    /// Counts a failure. Returns true if this failure opened a closed circuit.
    pub fn record_failure(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();

        inner.failure_count += 1;
        inner.last_failure = Some(now);

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.probe_in_flight = false;
                inner.rejection_reported = false;
                warn!(breaker = %self.name, "probe failed, circuit re-opened");
                false
            }
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.rejection_reported = false;
                warn!(
                    breaker = %self.name,
                    failures = inner.failure_count,
                    "circuit opened"
                );
                true
            }
            _ => false,
        }
    }

    /// Returns true for the first caller after the circuit opened; later
    /// callers get false until the circuit opens again.
    pub fn claim_rejection_report(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == CircuitState::Closed || inner.rejection_reported {
            return false;
        }
        inner.rejection_reported = true;
        true
    }

    /// Ends a probe that never reached the service (e.g. cancelled).
    ///
    /// The breaker returns to `Open` without counting a failure, so the next
    /// call probes again.
    pub fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.probe_in_flight = false;
        }
    }

    /// Returns the breaker to its initial closed state.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.probe_in_flight = false;
        inner.rejection_reported = false;
    }
}
