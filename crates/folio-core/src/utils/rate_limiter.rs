//! Rate limiting for external service calls
//!
//! Sliding-window ceilings per service, with adaptive throttling as usage
//! approaches a ceiling:
//! - below the slowdown threshold calls pass untouched
//! - between slowdown and pause thresholds calls pass with an advisory delay
//! - above the pause threshold calls are refused for the pause length
//!
//! `check_limit` and `record_usage` are advisory and may race between
//! callers; `acquire` runs both under one lock.

mod throttle;
mod types;

pub use throttle::throttle_delay;
pub use types::{LimitDecision, ServiceStatus, ThrottleState, UsagePercentages, WindowShares};

use crate::config::{ServiceLimits, ThrottleConfig};
use crate::event_bus::{EventBus, GovernanceEvent};
use crate::utils::{UsageKind, UsageWindowStore, Window};
use chrono::{DateTime, Utc};
use folio_cost::{Clock, SystemClock};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use throttle::{classify, Level, QuotaAlertLedger};
use tracing::{debug, info, warn};
use types::millis;

#[derive(Debug, Default)]
struct LimiterState {
    windows: UsageWindowStore,
    throttle: HashMap<String, ThrottleState>,
    alerts: QuotaAlertLedger,
}

/// Shared sliding-window rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    limits: HashMap<String, ServiceLimits>,
    throttle: ThrottleConfig,
    alert_thresholds: Vec<f64>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a limiter for the given service ceilings
    #[must_use]
    pub fn new(limits: HashMap<String, ServiceLimits>) -> Self {
        Self {
            limits,
            throttle: ThrottleConfig::default(),
            alert_thresholds: vec![0.5, 0.75, 0.9, 0.95],
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Set throttle thresholds
    #[must_use]
    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    /// Set quota alert thresholds
    #[must_use]
    pub fn with_alert_thresholds(mut self, thresholds: Vec<f64>) -> Self {
        self.alert_thresholds = thresholds;
        self
    }

    /// Use a specific clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish throttle and quota events on `events`
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Event bus this limiter publishes on
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Ceilings of a service, if configured
    #[must_use]
    pub fn limits(&self, service: &str) -> Option<&ServiceLimits> {
        self.limits.get(service)
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Check whether `amount` more usage would fit.
    ///
    /// Purges expired entries for the service but records nothing and
    /// leaves throttle state alone. An expired pause is judged against
    /// current usage without being cleared; `acquire` and
    /// [`RateLimiter::evaluate_all`] commit the recovery.
    pub fn check_limit(&self, service: &str, kind: UsageKind, amount: u64) -> LimitDecision {
        let now = self.clock.now();
        let mut state = self.lock();
        self.decide(&mut state, service, kind, amount, now, false)
    }

    /// Record usage and re-evaluate the service's throttle level
    pub fn record_usage(&self, service: &str, kind: UsageKind, amount: u64) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.windows.record(service, kind, amount, now);
        self.check_usage_levels(&mut state, service, now);
    }

    /// Check and, when allowed, record in one critical section
    pub fn acquire(&self, service: &str, kind: UsageKind, amount: u64) -> LimitDecision {
        let now = self.clock.now();
        let mut state = self.lock();
        let decision = self.decide(&mut state, service, kind, amount, now, true);
        if decision.allowed {
            state.windows.record(service, kind, amount, now);
            self.check_usage_levels(&mut state, service, now);
        }
        decision
    }

    /// Give back usage taken by `acquire` for a call that never completed
    pub fn release(&self, service: &str, kind: UsageKind, amount: u64) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.windows.purged(service, now);
        if state.windows.release(service, kind, amount) {
            debug!(service = %service, kind = %kind, amount = amount, "Reserved usage released");
            self.check_usage_levels(&mut state, service, now);
        }
    }

    fn decide(
        &self,
        state: &mut LimiterState,
        service: &str,
        kind: UsageKind,
        amount: u64,
        now: DateTime<Utc>,
        commit: bool,
    ) -> LimitDecision {
        let Some(limits) = self.limits.get(service) else {
            warn!(service = %service, "No rate limits configured for service, allowing");
            return LimitDecision::allow();
        };

        let usage = state.windows.purged(service, now);
        let window_limits = limits.for_kind(kind);
        for window in Window::ALL {
            let Some(limit) = window_limits.get(window) else {
                continue;
            };
            let current = usage.map_or(0, |u| u.current(kind, window));
            if current.saturating_add(amount) > limit {
                debug!(
                    service = %service,
                    kind = %kind,
                    window = %window,
                    current = current,
                    limit = limit,
                    "Rate limit reached"
                );
                return LimitDecision::window_exceeded(
                    kind,
                    window,
                    limit,
                    current,
                    window.reset_in(now),
                );
            }
        }

        let mut throttle = state.throttle.get(service).copied().unwrap_or_default();
        if throttle.paused {
            let remaining = throttle.pause_remaining(now);
            if !remaining.is_zero() {
                return LimitDecision::paused(remaining);
            }
            throttle = if commit {
                self.check_usage_levels(state, service, now);
                state.throttle.get(service).copied().unwrap_or_default()
            } else {
                self.projected_state(state, service, now)
            };
            if throttle.paused {
                return LimitDecision::paused(throttle.pause_remaining(now));
            }
        }

        if throttle.throttled && throttle.delay_ms > 0 {
            LimitDecision::allow_after(throttle.delay())
        } else {
            LimitDecision::allow()
        }
    }

    // ========================================================================
    // Adaptive throttling
    // ========================================================================

    fn projected_state(
        &self,
        state: &mut LimiterState,
        service: &str,
        now: DateTime<Utc>,
    ) -> ThrottleState {
        let Some(limits) = self.limits.get(service) else {
            return ThrottleState::default();
        };
        let counts = state.windows.counts(service, now);
        let usage = UsagePercentages::compute(&counts, limits).max();
        match classify(usage, &self.throttle) {
            Level::Paused => ThrottleState {
                throttled: true,
                paused: true,
                delay_ms: self.throttle.pause_secs.saturating_mul(1000),
                last_check: Some(now),
            },
            Level::Slowdown(delay) => ThrottleState {
                throttled: true,
                paused: false,
                delay_ms: millis(delay),
                last_check: Some(now),
            },
            Level::Normal => ThrottleState {
                last_check: Some(now),
                ..ThrottleState::default()
            },
        }
    }

    fn check_usage_levels(&self, state: &mut LimiterState, service: &str, now: DateTime<Utc>) {
        let Some(limits) = self.limits.get(service) else {
            return;
        };
        let counts = state.windows.counts(service, now);
        let usage = UsagePercentages::compute(&counts, limits).max();
        let previous = state.throttle.get(service).copied().unwrap_or_default();

        let next = match classify(usage, &self.throttle) {
            Level::Paused => {
                if previous.paused && !previous.pause_remaining(now).is_zero() {
                    previous
                } else {
                    warn!(service = %service, usage = usage, "Service paused");
                    self.events.publish(GovernanceEvent::ServicePaused {
                        service: service.to_string(),
                        usage,
                    });
                    ThrottleState {
                        throttled: true,
                        paused: true,
                        delay_ms: self.throttle.pause_secs.saturating_mul(1000),
                        last_check: Some(now),
                    }
                }
            }
            Level::Slowdown(delay) => {
                let next = ThrottleState {
                    throttled: true,
                    paused: false,
                    delay_ms: millis(delay),
                    last_check: Some(now),
                };
                if !previous.throttled || previous.paused || previous.delay_ms != next.delay_ms {
                    info!(
                        service = %service,
                        usage = usage,
                        delay_ms = next.delay_ms,
                        "Service throttled"
                    );
                    self.events.publish(GovernanceEvent::ServiceThrottled {
                        service: service.to_string(),
                        usage,
                        delay: next.delay_ms,
                    });
                }
                next
            }
            Level::Normal => {
                if previous.throttled {
                    info!(service = %service, usage = usage, "Service recovered");
                    self.events.publish(GovernanceEvent::ServiceRecovered {
                        service: service.to_string(),
                        usage,
                    });
                }
                ThrottleState {
                    last_check: Some(now),
                    ..ThrottleState::default()
                }
            }
        };
        state.throttle.insert(service.to_string(), next);

        let crossed = state.alerts.newly_crossed(
            service,
            usage,
            &self.alert_thresholds,
            now.date_naive(),
        );
        for threshold in crossed {
            info!(
                service = %service,
                usage = usage,
                threshold = threshold,
                "Quota threshold reached"
            );
            self.events.publish(GovernanceEvent::QuotaAlert {
                service: service.to_string(),
                usage,
                threshold,
                limits: *limits,
                current_usage: counts,
            });
        }
    }

    /// Re-evaluate throttle levels of every configured service.
    ///
    /// Windows slide on their own, so a throttled service recovers here
    /// even when no new usage arrives.
    pub fn evaluate_all(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        for service in self.limits.keys() {
            self.check_usage_levels(&mut state, service, now);
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Purge expired entries for every service.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let removed = self.lock().windows.purge_all(now);
        debug!(removed = removed, "Usage windows cleaned up");
        removed
    }

    /// Clear usage, throttle state and sent alerts of one service
    pub fn reset(&self, service: &str) {
        let mut state = self.lock();
        state.windows.clear(service);
        state.throttle.remove(service);
        state.alerts.forget(service);
        info!(service = %service, "Rate limiter state reset");
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Throttle state of a service
    #[must_use]
    pub fn throttle_state(&self, service: &str) -> ThrottleState {
        self.lock().throttle.get(service).copied().unwrap_or_default()
    }

    /// Snapshot of one service, `None` if it is neither configured nor used
    #[must_use]
    pub fn get_status(&self, service: &str) -> Option<ServiceStatus> {
        let now = self.clock.now();
        let mut state = self.lock();
        let known = self.limits.contains_key(service)
            || state.windows.services().any(|s| s == service);
        known.then(|| self.status_of(&mut state, service, now))
    }

    /// Snapshots of all configured and observed services, sorted by name
    #[must_use]
    pub fn get_all_status(&self) -> Vec<ServiceStatus> {
        let now = self.clock.now();
        let mut state = self.lock();
        let services: BTreeSet<String> = self
            .limits
            .keys()
            .cloned()
            .chain(state.windows.services().map(str::to_string))
            .collect();
        services
            .iter()
            .map(|service| self.status_of(&mut state, service, now))
            .collect()
    }

    fn status_of(
        &self,
        state: &mut LimiterState,
        service: &str,
        now: DateTime<Utc>,
    ) -> ServiceStatus {
        let limits = self.limits.get(service).copied().unwrap_or_default();
        let usage = state.windows.counts(service, now);
        ServiceStatus {
            service: service.to_string(),
            usage,
            percentages: UsagePercentages::compute(&usage, &limits),
            limits,
            throttle: state.throttle.get(service).copied().unwrap_or_default(),
        }
    }

    /// Remaining pause of a service
    #[must_use]
    pub fn pause_remaining(&self, service: &str) -> Duration {
        let now = self.clock.now();
        self.throttle_state(service).pause_remaining(now)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(crate::config::default_rate_limits())
    }
}

#[cfg(test)]
mod tests;
