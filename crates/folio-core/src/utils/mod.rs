//! Governance primitives for folio-core
//!
//! - usage_window: sliding request/token counters per service
//! - rate_limiter: window ceilings with adaptive throttling
//! - circuit_breaker: timeout and failure isolation per dependency

mod circuit_breaker;
mod rate_limiter;
mod usage_window;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitError, CircuitSnapshot,
    CircuitState,
};
pub use rate_limiter::{
    throttle_delay, LimitDecision, RateLimiter, ServiceStatus, ThrottleState, UsagePercentages,
    WindowShares,
};
pub use usage_window::{
    ServiceUsage, UsageCounts, UsageEntry, UsageKind, UsageWindowStore, Window, WindowCounts,
};
