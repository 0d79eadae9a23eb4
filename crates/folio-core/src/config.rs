//! Governance configuration
//!
//! Deserialized from the `[governance]` section of the application config.
//! Every section has defaults, so an empty table yields a working setup.

use crate::utils::{CircuitBreakerConfig, UsageKind, Window};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Optional ceilings for one usage kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowLimits {
    /// Ceiling over the last minute
    #[serde(default, alias = "per_minute")]
    pub per_minute: Option<u64>,
    /// Ceiling over the last hour
    #[serde(default, alias = "per_hour")]
    pub per_hour: Option<u64>,
    /// Ceiling over the last day
    #[serde(default, alias = "per_day")]
    pub per_day: Option<u64>,
}

impl WindowLimits {
    /// Limits with only a per-minute ceiling
    #[must_use]
    pub fn per_minute(limit: u64) -> Self {
        Self {
            per_minute: Some(limit),
            ..Self::default()
        }
    }

    /// Add a per-hour ceiling
    #[must_use]
    pub fn with_per_hour(mut self, limit: u64) -> Self {
        self.per_hour = Some(limit);
        self
    }

    /// Add a per-day ceiling
    #[must_use]
    pub fn with_per_day(mut self, limit: u64) -> Self {
        self.per_day = Some(limit);
        self
    }

    /// Ceiling for a window
    #[must_use]
    pub fn get(&self, window: Window) -> Option<u64> {
        match window {
            Window::Minute => self.per_minute,
            Window::Hour => self.per_hour,
            Window::Day => self.per_day,
        }
    }

    /// Whether any ceiling is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.per_minute.is_none() && self.per_hour.is_none() && self.per_day.is_none()
    }
}

/// Request and token ceilings for one external service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLimits {
    /// Request ceilings
    #[serde(default)]
    pub requests: WindowLimits,
    /// Token ceilings
    #[serde(default)]
    pub tokens: WindowLimits,
}

impl ServiceLimits {
    /// Request-only limits
    #[must_use]
    pub fn requests(requests: WindowLimits) -> Self {
        Self {
            requests,
            tokens: WindowLimits::default(),
        }
    }

    /// Add token ceilings
    #[must_use]
    pub fn with_tokens(mut self, tokens: WindowLimits) -> Self {
        self.tokens = tokens;
        self
    }

    /// Ceilings for a usage kind
    #[must_use]
    pub fn for_kind(&self, kind: UsageKind) -> &WindowLimits {
        match kind {
            UsageKind::Request => &self.requests,
            UsageKind::Token => &self.tokens,
        }
    }
}

/// Adaptive throttling thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Usage share at which advisory delays start
    #[serde(default = "default_slowdown_threshold")]
    pub slowdown_threshold: f64,
    /// Usage share at which the service is paused
    #[serde(default = "default_pause_threshold")]
    pub pause_threshold: f64,
    /// Delay reached at the pause threshold (ms)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Pause length (seconds)
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
}

fn default_slowdown_threshold() -> f64 {
    0.8
}
fn default_pause_threshold() -> f64 {
    0.95
}
fn default_max_delay_ms() -> u64 {
    5000
}
fn default_pause_secs() -> u64 {
    60
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            slowdown_threshold: default_slowdown_threshold(),
            pause_threshold: default_pause_threshold(),
            max_delay_ms: default_max_delay_ms(),
            pause_secs: default_pause_secs(),
        }
    }
}

/// Quota alert settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Usage shares that trigger one alert per service per day
    #[serde(default = "default_alert_thresholds")]
    pub thresholds: Vec<f64>,
    /// Optional URL receiving alert payloads as JSON POSTs
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_alert_thresholds() -> Vec<f64> {
    vec![0.5, 0.75, 0.9, 0.95]
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            thresholds: default_alert_thresholds(),
            webhook_url: None,
        }
    }
}

/// Circuit breaker settings as written in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Per-call timeout (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Cooldown before a probe is allowed (ms)
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_reset_timeout_ms() -> u64 {
    60_000
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

impl From<BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: BreakerSettings) -> Self {
        CircuitBreakerConfig::new()
            .with_timeout(Duration::from_millis(settings.timeout_ms))
            .with_failure_threshold(settings.failure_threshold)
            .with_reset_timeout(Duration::from_millis(settings.reset_timeout_ms))
    }
}

/// Default breaker plus per-dependency overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakersConfig {
    /// Settings for dependencies without an override
    #[serde(default)]
    pub default: BreakerSettings,
    /// Per-dependency overrides
    #[serde(default)]
    pub services: HashMap<String, BreakerSettings>,
}

/// Background maintenance intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Window cleanup interval (seconds)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Throttle re-evaluation interval (seconds)
    #[serde(default = "default_recheck_interval")]
    pub recheck_interval_secs: u64,
}

fn default_cleanup_interval() -> u64 {
    60
}
fn default_recheck_interval() -> u64 {
    10
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            recheck_interval_secs: default_recheck_interval(),
        }
    }
}

/// Complete governance configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Per-service ceilings
    #[serde(default = "default_rate_limits")]
    pub rate_limits: HashMap<String, ServiceLimits>,
    /// Adaptive throttling
    #[serde(default)]
    pub throttle: ThrottleConfig,
    /// Quota alerts
    #[serde(default)]
    pub alerts: AlertConfig,
    /// Circuit breakers
    #[serde(default)]
    pub breakers: BreakersConfig,
    /// Background maintenance
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Event bus buffer size
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

/// Ceilings for the services an ebook pipeline calls
#[must_use]
pub fn default_rate_limits() -> HashMap<String, ServiceLimits> {
    HashMap::from([
        (
            "anthropic".to_string(),
            ServiceLimits::requests(WindowLimits::per_minute(50).with_per_hour(1000))
                .with_tokens(WindowLimits::per_minute(40_000).with_per_hour(400_000)),
        ),
        (
            "openai".to_string(),
            ServiceLimits::requests(WindowLimits::per_minute(60).with_per_hour(3500))
                .with_tokens(WindowLimits::per_minute(90_000)),
        ),
        (
            "perplexity".to_string(),
            ServiceLimits::requests(
                WindowLimits::per_minute(20)
                    .with_per_hour(500)
                    .with_per_day(5000),
            ),
        ),
        (
            "ideogram".to_string(),
            ServiceLimits::requests(WindowLimits::per_minute(5).with_per_hour(100).with_per_day(1000)),
        ),
    ])
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            rate_limits: default_rate_limits(),
            throttle: ThrottleConfig::default(),
            alerts: AlertConfig::default(),
            breakers: BreakersConfig::default(),
            maintenance: MaintenanceConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[cfg(test)]
mod tests;
