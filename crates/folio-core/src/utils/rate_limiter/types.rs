//! Rate limiter value types

use crate::config::{ServiceLimits, WindowLimits};
use crate::utils::{UsageCounts, UsageKind, Window, WindowCounts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of an admission check
///
/// Denials are values, not errors: the caller decides whether to wait
/// `reset_in` or give up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitDecision {
    /// Whether the call may proceed
    pub allowed: bool,
    /// Why the call was denied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Usage kind that hit its ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<UsageKind>,
    /// Window that hit its ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<Window>,
    /// Ceiling of that window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Usage in that window before this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    /// Milliseconds until the window's next aligned boundary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_in_ms: Option<u64>,
    /// Advisory wait (allowed) or remaining pause (denied), in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl LimitDecision {
    /// Unconditional admission
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            kind: None,
            window: None,
            limit: None,
            current: None,
            reset_in_ms: None,
            delay_ms: None,
        }
    }

    /// Admission with an advisory delay
    #[must_use]
    pub fn allow_after(delay: Duration) -> Self {
        Self {
            delay_ms: Some(millis(delay)),
            ..Self::allow()
        }
    }

    /// Denial because a window ceiling would be exceeded
    #[must_use]
    pub fn window_exceeded(
        kind: UsageKind,
        window: Window,
        limit: u64,
        current: u64,
        reset_in: Duration,
    ) -> Self {
        Self {
            allowed: false,
            reason: Some(format!("{} {window} limit exceeded", kind.label())),
            kind: Some(kind),
            window: Some(window),
            limit: Some(limit),
            current: Some(current),
            reset_in_ms: Some(millis(reset_in)),
            delay_ms: None,
        }
    }

    /// Denial because the service is paused
    #[must_use]
    pub fn paused(remaining: Duration) -> Self {
        Self {
            allowed: false,
            reason: Some("Service paused".to_string()),
            delay_ms: Some(millis(remaining)),
            ..Self::allow()
        }
    }

    /// Time until the exceeded window resets
    #[must_use]
    pub fn reset_in(&self) -> Option<Duration> {
        self.reset_in_ms.map(Duration::from_millis)
    }

    /// Advisory delay or remaining pause
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(Duration::from_millis)
    }

    /// How long a denied caller should wait before retrying
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        if self.allowed {
            return None;
        }
        self.reset_in().or_else(|| self.delay())
    }
}

impl std::fmt::Display for LimitDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.reason, self.current, self.limit) {
            (Some(reason), Some(current), Some(limit)) => {
                write!(f, "{reason} ({current}/{limit})")
            }
            (Some(reason), _, _) => write!(f, "{reason}"),
            (None, _, _) => write!(f, "allowed"),
        }
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Adaptive throttle state of one service
///
/// `paused` implies `throttled`, and a non-zero delay implies `throttled`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleState {
    /// Callers should slow down
    pub throttled: bool,
    /// Callers are refused until the pause elapses
    pub paused: bool,
    /// Advisory delay, or the pause length when paused (ms)
    pub delay_ms: u64,
    /// When the state was last evaluated
    pub last_check: Option<DateTime<Utc>>,
}

impl ThrottleState {
    /// Advisory delay or pause length
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Time left in a pause, zero once it has elapsed or when not paused
    #[must_use]
    pub fn pause_remaining(&self, now: DateTime<Utc>) -> Duration {
        if !self.paused {
            return Duration::ZERO;
        }
        let elapsed = self
            .last_check
            .and_then(|at| (now - at).to_std().ok())
            .unwrap_or(Duration::ZERO);
        self.delay().saturating_sub(elapsed)
    }
}

/// Usage shares per window; `None` where no ceiling is set
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowShares {
    /// Share of the minute ceiling
    pub minute: Option<f64>,
    /// Share of the hour ceiling
    pub hour: Option<f64>,
    /// Share of the day ceiling
    pub day: Option<f64>,
}

impl WindowShares {
    pub(crate) fn compute(counts: &WindowCounts, limits: &WindowLimits) -> Self {
        let share = |w| limits.get(w).map(|limit| usage_share(counts.get(w), limit));
        Self {
            minute: share(Window::Minute),
            hour: share(Window::Hour),
            day: share(Window::Day),
        }
    }

    fn max(&self) -> Option<f64> {
        [self.minute, self.hour, self.day]
            .into_iter()
            .flatten()
            .reduce(f64::max)
    }
}

/// Usage shares for requests and tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsagePercentages {
    /// Request shares
    pub requests: WindowShares,
    /// Token shares
    pub tokens: WindowShares,
}

impl UsagePercentages {
    /// Shares of every configured ceiling
    #[must_use]
    pub fn compute(counts: &UsageCounts, limits: &ServiceLimits) -> Self {
        Self {
            requests: WindowShares::compute(&counts.requests, &limits.requests),
            tokens: WindowShares::compute(&counts.tokens, &limits.tokens),
        }
    }

    /// Highest share across all ceilings, zero when none is set
    #[must_use]
    pub fn max(&self) -> f64 {
        [self.requests.max(), self.tokens.max()]
            .into_iter()
            .flatten()
            .fold(0.0, f64::max)
    }
}

fn usage_share(current: u64, limit: u64) -> f64 {
    if limit == 0 {
        return if current == 0 { 0.0 } else { 1.0 };
    }
    current as f64 / limit as f64
}

/// Read-only snapshot of one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Service name
    pub service: String,
    /// Current counts
    pub usage: UsageCounts,
    /// Usage shares of each ceiling
    pub percentages: UsagePercentages,
    /// Configured ceilings
    pub limits: ServiceLimits,
    /// Throttle state
    pub throttle: ThrottleState,
}
