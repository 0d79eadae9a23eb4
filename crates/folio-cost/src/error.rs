//! Error types for folio-cost

use thiserror::Error;

/// Cost tracking error type
#[derive(Debug, Error)]
pub enum Error {
    /// Session spend went over the per-book ceiling
    #[error("per-book budget exceeded: spent ${spent:.4} of ${limit:.2}")]
    BudgetExceeded {
        /// Amount spent in the current session (USD)
        spent: f64,
        /// Configured per-book ceiling (USD)
        limit: f64,
    },

    /// A track call arrived with no session running
    #[error("no active cost session")]
    NoActiveSession,

    /// `start_session` called while another session is running
    #[error("session already active: {0}")]
    SessionAlreadyActive(String),

    /// Ledger or budget storage failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// JSON (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller must abort the current book
    #[must_use]
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
