//! Circuit Breaker pattern implementation
//!
//! Wraps one external dependency with a timeout and failure bookkeeping.
//! The circuit breaker has three states:
//! - Closed: Normal operation, calls pass through
//! - Open: Failures reached the threshold, calls are rejected or fall back
//! - HalfOpen: Cooldown elapsed, probe calls test whether the dependency recovered

mod registry;

pub use registry::CircuitBreakerRegistry;

use crate::event_bus::{EventBus, GovernanceEvent};
use chrono::{DateTime, Utc};
use folio_cost::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Failures reached the threshold - calls are rejected
    Open,
    /// Testing recovery - probe calls pass through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Time allowed for a single call
    pub timeout: Duration,
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Number of successes in half-open state to close the circuit
    pub success_threshold: u32,
    /// Duration to wait before a probe is allowed
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set success threshold for half-open state
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// Set reset timeout
    #[must_use]
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

/// Why a guarded call did not produce a value
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit is open and the cooldown has not elapsed
    #[error("circuit '{name}' is open: {}", last_error.as_deref().unwrap_or("no recorded error"))]
    Open {
        /// Breaker name
        name: String,
        /// Last upstream error
        last_error: Option<String>,
    },

    /// The call exceeded the breaker timeout and was cancelled
    #[error("'{name}' timed out after {}ms", after.as_millis())]
    Timeout {
        /// Breaker name
        name: String,
        /// Configured timeout
        after: Duration,
    },

    /// The call itself failed
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitError<E> {
    /// Whether the call was rejected without running
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Whether the call timed out
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The upstream error, if the call ran and failed
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures
    pub failures: u32,
    /// Successes while half-open
    pub success_count: u32,
    /// Earliest time a probe is allowed while open
    pub next_attempt: Option<DateTime<Utc>>,
    /// Last upstream error
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    success_count: u32,
    next_attempt: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            success_count: 0,
            next_attempt: None,
            last_error: None,
        }
    }
}

/// Circuit breaker for one external dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            clock: Arc::new(SystemClock),
            events: None,
            inner: Mutex::new(BreakerState::default()),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Use a specific clock for cooldowns
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish state changes on `events`
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Get the circuit breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get current failure count
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    /// Snapshot for dashboards
    #[must_use]
    pub fn stats(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
            success_count: inner.success_count,
            next_attempt: inner.next_attempt,
            last_error: inner.last_error.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `op` through the breaker.
    ///
    /// The call is raced against the configured timeout; a timed-out call is
    /// dropped, which cancels it at its next await point.
    pub async fn fire<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.admit()?;

        match tokio::time::timeout(self.config.timeout, op()).await {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.on_failure(err.to_string());
                Err(CircuitError::Inner(err))
            }
            Err(_) => {
                let err = CircuitError::Timeout {
                    name: self.name.clone(),
                    after: self.config.timeout,
                };
                self.on_failure(err.to_string());
                Err(err)
            }
        }
    }

    /// Run `op` through the breaker, answering with `fallback` on any failure
    pub async fn fire_with_fallback<F, Fut, T, E, G>(&self, op: F, fallback: G) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        G: FnOnce(CircuitError<E>) -> T,
    {
        match self.fire(op).await {
            Ok(value) => value,
            Err(err) => {
                debug!(name = %self.name, error = %err, "Circuit breaker using fallback");
                fallback(err)
            }
        }
    }

    /// The error `fire` would answer with right now, without running anything.
    ///
    /// `Some` only while open with the cooldown still running.
    #[must_use]
    pub fn rejection<E>(&self) -> Option<CircuitError<E>> {
        let inner = self.lock();
        self.rejection_of(&inner, self.clock.now())
    }

    fn rejection_of<E>(&self, inner: &BreakerState, now: DateTime<Utc>) -> Option<CircuitError<E>> {
        let cooling = inner.state == CircuitState::Open
            && inner.next_attempt.is_some_and(|at| now < at);
        cooling.then(|| CircuitError::Open {
            name: self.name.clone(),
            last_error: inner.last_error.clone(),
        })
    }

    fn admit<E>(&self) -> Result<(), CircuitError<E>> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        if let Some(err) = self.rejection_of(&inner, self.clock.now()) {
            return Err(err);
        }

        info!(name = %self.name, "Circuit breaker entering half-open state");
        inner.success_count = 0;
        self.transition(&mut inner, CircuitState::HalfOpen);
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.success_count += 1;
            debug!(
                name = %self.name,
                successes = inner.success_count,
                threshold = self.config.success_threshold,
                "Circuit breaker success in half-open state"
            );
            if inner.success_count >= self.config.success_threshold {
                info!(name = %self.name, "Circuit breaker closed");
                inner.success_count = 0;
                self.transition(&mut inner, CircuitState::Closed);
            }
        }
    }

    fn on_failure(&self, error: String) {
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        debug!(
            name = %self.name,
            failures = inner.failures,
            threshold = self.config.failure_threshold,
            error = %error,
            "Circuit breaker failure recorded"
        );
        inner.last_error = Some(error);

        if inner.failures >= self.config.failure_threshold {
            let cooldown = chrono::Duration::from_std(self.config.reset_timeout)
                .unwrap_or_else(|_| chrono::Duration::zero());
            inner.next_attempt = Some(self.clock.now() + cooldown);
            if inner.state != CircuitState::Open {
                warn!(
                    name = %self.name,
                    failures = inner.failures,
                    last_error = ?inner.last_error,
                    "Circuit breaker opened"
                );
                inner.success_count = 0;
                self.transition(&mut inner, CircuitState::Open);
            }
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        self.publish(from, to);
    }

    fn publish(&self, from: CircuitState, to: CircuitState) {
        if let Some(events) = &self.events {
            events.publish(GovernanceEvent::CircuitStateChanged {
                name: self.name.clone(),
                from,
                to,
            });
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut inner = self.lock();
        let from = inner.state;
        *inner = BreakerState::default();
        if from != CircuitState::Closed {
            info!(name = %self.name, "Circuit breaker reset");
            self.publish(from, CircuitState::Closed);
        }
    }
}
