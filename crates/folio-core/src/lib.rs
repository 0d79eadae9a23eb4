//! Folio Core - resource governance for ebook pipelines
//!
//! Pipeline workers share one governance layer between them and the paid
//! external services they call:
//! - Utils: sliding usage windows, rate limiter with adaptive throttling,
//!   circuit breakers with timeouts
//! - Events: broadcast bus for throttle, quota and circuit notifications
//! - Alerts: quota alert webhook
//! - Maintenance: window cleanup and throttle recovery tickers
//! - Governor: the facade that runs one call through all of the above and
//!   reports spend to the cost tracker

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod alerts;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod governor;
pub mod maintenance;
pub mod utils;

pub use alerts::QuotaAlertWebhook;
pub use config::{
    AlertConfig, BreakerSettings, BreakersConfig, GovernanceConfig, MaintenanceConfig,
    ServiceLimits, ThrottleConfig, WindowLimits,
};
pub use error::{format_error_for_cli, Error, Result};
pub use event_bus::{EventBus, GovernanceEvent};
pub use governor::{CallUsage, GovernanceStatus, Governor, Metered};
pub use maintenance::Maintenance;
pub use utils::{
    throttle_delay, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitError,
    CircuitSnapshot, CircuitState, LimitDecision, RateLimiter, ServiceStatus, ThrottleState,
    UsageCounts, UsageKind, Window,
};

// Time source shared with the cost tracker
pub use folio_cost::{Clock, ManualClock, SystemClock};
