//! Resilient executor: retry with backoff stacked under a circuit breaker.
//!
//! ```text
//! execute(label, op)
//!     → with_circuit_breaker  (reject locally while open)
//!         → with_retry        (offline check, backoff, allowlist)
//!             → op()
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::error::{ConfigError, RemoteError, ResilienceError, Result};
use crate::notify::{Notification, NotificationKind, NotificationSink, TracingSink};
use crate::resilience::{
    is_non_retriable, Admission, AlwaysOnline, CircuitBreaker, CircuitBreakerConfig,
    CircuitState, Connectivity, RetryConfig,
};

const RECONNECTING_DURATION: Duration = Duration::from_millis(3000);
const RESTORED_DURATION: Duration = Duration::from_millis(2000);
const UNAVAILABLE_DURATION: Duration = Duration::from_millis(5000);
const FAILURE_DURATION: Duration = Duration::from_millis(5000);

// == Error Conversion ==
/// Errors an operation wrapped by the circuit breaker may fail with.
pub trait IntoResilienceError {
    fn into_resilience_error(self, operation: &str) -> ResilienceError;
}

impl IntoResilienceError for ResilienceError {
    fn into_resilience_error(self, _operation: &str) -> ResilienceError {
        self
    }
}

impl IntoResilienceError for RemoteError {
    fn into_resilience_error(self, operation: &str) -> ResilienceError {
        let operation = operation.to_string();
        if is_non_retriable(&self) {
            ResilienceError::NonRetriable {
                operation,
                source: self,
            }
        } else {
            ResilienceError::Remote {
                operation,
                source: self,
            }
        }
    }
}

// == Builder ==
/// Builder for [`ResilientExecutor`]; collaborators default to
/// [`TracingSink`], [`AlwaysOnline`] and [`SystemClock`].
pub struct ResilientExecutorBuilder {
    name: String,
    retry: RetryConfig,
    breaker: CircuitBreakerConfig,
    notifier: Arc<dyn NotificationSink>,
    connectivity: Arc<dyn Connectivity>,
    clock: SharedClock,
}

impl ResilientExecutorBuilder {
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> std::result::Result<ResilientExecutor, ConfigError> {
        self.retry.validate()?;
        let breaker = CircuitBreaker::with_clock(self.name, self.breaker, self.clock)?;
        Ok(ResilientExecutor {
            retry: self.retry,
            breaker: Arc::new(breaker),
            notifier: self.notifier,
            connectivity: self.connectivity,
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
        })
    }
}

// == Resilient Executor ==
/// Runs remote operations with retry and a circuit breaker.
///
/// One executor protects one class of operations (e.g. "payments"); every
/// call through it shares the same breaker. Clones share the breaker and
/// the cancellation token.
#[derive(Clone)]
pub struct ResilientExecutor {
    retry: RetryConfig,
    breaker: Arc<CircuitBreaker>,
    notifier: Arc<dyn NotificationSink>,
    connectivity: Arc<dyn Connectivity>,
    /// Cancels pending retry sleeps; replaced on every `cleanup`
    cancel: Arc<Mutex<CancellationToken>>,
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .finish()
    }
}

impl ResilientExecutor {
    /// Starts a builder for an executor guarding `name`.
    pub fn builder(name: impl Into<String>) -> ResilientExecutorBuilder {
        ResilientExecutorBuilder {
            name: name.into(),
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            notifier: Arc::new(TracingSink),
            connectivity: Arc::new(AlwaysOnline),
            clock: Arc::new(SystemClock),
        }
    }

    /// Executor with default collaborators and the given policies.
    pub fn new(
        name: impl Into<String>,
        retry: RetryConfig,
        breaker: CircuitBreakerConfig,
    ) -> std::result::Result<Self, ConfigError> {
        Self::builder(name)
            .retry(retry)
            .circuit_breaker(breaker)
            .build()
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn failure_count(&self) -> u32 {
        self.breaker.failure_count()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    // == Execute ==
    /// Runs `operation` through the circuit breaker and the executor's retry policy.
    ///
    /// The pipeline runs on its own task. Dropping the returned future only
    /// stops waiting for it: retries go on until they settle or `cleanup`
    /// cancels them, and the outcome is still recorded on the breaker.
    pub async fn execute<T, F, Fut>(&self, label: &str, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, RemoteError>> + Send + 'static,
    {
        self.execute_with(label, &self.retry, operation).await
    }

    /// Like [`execute`](Self::execute) with a per-call retry policy.
    pub async fn execute_with<T, F, Fut>(
        &self,
        label: &str,
        config: &RetryConfig,
        operation: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, RemoteError>> + Send + 'static,
    {
        let executor = self.clone();
        let config = config.clone();
        let owned_label = label.to_string();

        let task = tokio::spawn(async move {
            let label = owned_label.as_str();
            executor
                .with_circuit_breaker(label, || executor.with_retry(label, &config, operation))
                .await
        });

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            // Runtime shutting down
            Err(_) => Err(ResilienceError::Cancelled {
                operation: label.to_string(),
            }),
        }
    }

    // == Retry ==
    /// Retries `operation` with exponential backoff and jitter.
    ///
    /// Allowlisted errors (not found, unauthorized, forbidden, aborted) are
    /// returned at once. While offline an attempt fails with a connectivity
    /// error without invoking `operation`; it is still retried.
    pub async fn with_retry<T, F, Fut>(
        &self,
        label: &str,
        config: &RetryConfig,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        let cancel = self.cancel_token();
        let mut attempt: u32 = 0;

        loop {
            let outcome = if self.connectivity.is_online() {
                operation().await
            } else {
                Err(RemoteError::offline())
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation = label, retries = attempt, "operation recovered");
                        self.notify(
                            NotificationKind::Success,
                            "Connection restored",
                            format!("\"{label}\" completed successfully."),
                            RESTORED_DURATION,
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if is_non_retriable(&error) {
                debug!(operation = label, error = %error, "non-retriable error");
                return Err(ResilienceError::NonRetriable {
                    operation: label.to_string(),
                    source: error,
                });
            }

            if attempt >= config.max_retries {
                let exhausted = ResilienceError::Exhausted {
                    operation: label.to_string(),
                    attempts: attempt + 1,
                    source: error,
                };
                warn!(operation = label, error = %exhausted, "retries exhausted");
                self.notify(
                    NotificationKind::Error,
                    "Operation failed",
                    exhausted.user_message(),
                    FAILURE_DURATION,
                );
                return Err(exhausted);
            }

            let delay = config.jittered_delay(attempt);
            if attempt == 0 {
                self.notify(
                    NotificationKind::Info,
                    "Reconnecting",
                    format!("Connection issue while running \"{label}\", retrying..."),
                    RECONNECTING_DURATION,
                );
            }
            warn!(
                operation = label,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "attempt failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(operation = label, "pending retry cancelled");
                    return Err(ResilienceError::Cancelled {
                        operation: label.to_string(),
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    // == Circuit Breaker ==
    /// Runs `operation` once if the breaker admits it and records the outcome.
    ///
    /// Service failures count against the breaker; non-retriable answers
    /// count as success since the service responded. The first rejection of
    /// each open period is reported through the notifier.
    pub async fn with_circuit_breaker<T, E, F, Fut>(&self, label: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: IntoResilienceError,
    {
        let admission = match self.breaker.acquire(label) {
            Ok(admission) => admission,
            Err(rejected) => {
                if matches!(rejected, ResilienceError::CircuitOpen { .. })
                    && self.breaker.claim_rejection_report()
                {
                    self.notify(
                        NotificationKind::Error,
                        "Operation failed",
                        rejected.user_message(),
                        FAILURE_DURATION,
                    );
                }
                return Err(rejected);
            }
        };
        let mut slot = ProbeSlot {
            breaker: &self.breaker,
            armed: admission == Admission::Probe,
        };
        let outcome = operation().await;
        slot.armed = false;

        match outcome {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(error) => {
                let error = error.into_resilience_error(label);
                if error.is_service_failure() {
                    if self.breaker.record_failure() {
                        self.notify(
                            NotificationKind::Warning,
                            "Service temporarily unavailable",
                            format!(
                                "Pausing requests for {} seconds after repeated failures.",
                                self.breaker.config().cooldown.as_secs()
                            ),
                            UNAVAILABLE_DURATION,
                        );
                    }
                } else if matches!(error, ResilienceError::NonRetriable { .. }) {
                    self.breaker.record_success();
                } else if admission == Admission::Probe {
                    self.breaker.release_probe();
                }
                Err(error)
            }
        }
    }

    // == Cleanup ==
    /// Cancels every pending retry sleep.
    ///
    /// Affected calls fail with [`ResilienceError::Cancelled`]; settled calls
    /// are untouched and the executor accepts new calls afterwards.
    pub fn cleanup(&self) {
        let mut cancel = self
            .cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cancel.cancel();
        *cancel = CancellationToken::new();
        debug!(executor = self.name(), "pending retries cancelled");
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn notify(
        &self,
        kind: NotificationKind,
        title: &str,
        description: impl Into<String>,
        duration: Duration,
    ) {
        self.notifier
            .notify(Notification::new(kind, title, description, duration));
    }
}

/// Frees a half-open probe slot when a call is dropped before it settles.
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}
