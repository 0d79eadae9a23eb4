//! Error types for folio-core
//!
//! Rate limit denials are values ([`LimitDecision`]); they only become an
//! [`Error`] when the [`Governor`](crate::Governor) runs a call on the
//! caller's behalf.

use crate::utils::{CircuitError, LimitDecision};
use std::time::Duration;
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Admission denied by the rate limiter
    #[error("rate limited: {0}")]
    RateLimited(LimitDecision),

    /// Circuit is open and no fallback answered
    #[error("circuit '{name}' is open: {}", last_error.as_deref().unwrap_or("no recorded error"))]
    CircuitOpen {
        /// Dependency name
        name: String,
        /// Last upstream error
        last_error: Option<String>,
    },

    /// Call exceeded the breaker timeout
    #[error("'{name}' timed out after {}ms", after.as_millis())]
    Timeout {
        /// Dependency name
        name: String,
        /// Configured timeout
        after: Duration,
    },

    /// External call failed
    #[error("{name} call failed: {message}")]
    Upstream {
        /// Dependency name
        name: String,
        /// Upstream error message
        message: String,
    },

    /// Cost tracking failed, including the per-book hard stop
    #[error("cost error: {0}")]
    Cost(#[from] folio_cost::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Quota alert delivery failed
    #[error("webhook error: {0}")]
    Webhook(String),
}

impl Error {
    /// Lift a breaker error for dependency `name`
    pub fn from_circuit<E: std::fmt::Display>(name: &str, err: CircuitError<E>) -> Self {
        match err {
            CircuitError::Open { name, last_error } => Self::CircuitOpen { name, last_error },
            CircuitError::Timeout { name, after } => Self::Timeout { name, after },
            CircuitError::Inner(e) => Self::Upstream {
                name: name.to_string(),
                message: e.to_string(),
            },
        }
    }

    /// Whether the current book must be abandoned
    #[must_use]
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::Cost(e) if e.is_budget_exceeded())
    }

    /// Whether retrying later may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::CircuitOpen { .. } | Self::Timeout { .. }
        )
    }

    /// Short operator-facing message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Error::RateLimited(decision) => match decision.retry_after() {
                Some(wait) => format!(
                    "⏳ {} - retry in {}s.",
                    decision,
                    wait.as_secs().max(1)
                ),
                None => format!("⏳ {decision}."),
            },
            Error::CircuitOpen { name, .. } => format!("🔌 {name} is unavailable (circuit open)."),
            Error::Timeout { name, after } => {
                format!("⌛ {name} did not answer within {}s.", after.as_secs())
            }
            Error::Upstream { name, message } => format!("🌐 {name} failed: {message}"),
            Error::Cost(e) if e.is_budget_exceeded() => format!("💸 {e}"),
            Error::Cost(e) => format!("💰 Cost tracking error: {e}"),
            Error::Configuration(msg) => format!("⚙️ Configuration error: {msg}"),
            Error::Webhook(msg) => format!("📡 Alert delivery failed: {msg}"),
        }
    }

    /// How to fix it, when there is something to do
    #[must_use]
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::RateLimited(_) => {
                Some("💡 Lower concurrency or raise the limit under [governance.rate_limits].".to_string())
            }
            Error::CircuitOpen { .. } => {
                Some("💡 Wait for the cooldown; `folio status` shows when the next probe runs.".to_string())
            }
            Error::Cost(e) if e.is_budget_exceeded() => {
                Some("💡 Raise the ceiling with `folio budget set --per-book <USD>`.".to_string())
            }
            Error::Configuration(_) => {
                Some("💡 Check config/default.toml and FOLIO_* environment variables.".to_string())
            }
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
#[must_use]
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = error.user_message();
    if let Some(suggestion) = error.suggestion() {
        output.push_str("\n\n");
        output.push_str(&suggestion);
    }
    output.push('\n');
    output
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
