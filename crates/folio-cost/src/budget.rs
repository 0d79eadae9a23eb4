//! Budget evaluation

use crate::error::{Error, Result};
use crate::ledger::{Budgets, CostLedger};
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which ceiling a check refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BudgetScope {
    /// Current session (book)
    PerBook,
    /// Current calendar day
    Daily,
    /// Current calendar month
    Monthly,
}

impl std::fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PerBook => write!(f, "per-book"),
            Self::Daily => write!(f, "daily"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

/// Spend measured against one ceiling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetCheck {
    /// Ceiling
    pub scope: BudgetScope,
    /// Spend so far (USD)
    pub spent: f64,
    /// Ceiling (USD)
    pub limit: f64,
    /// `spent / limit`
    pub ratio: f64,
}

impl BudgetCheck {
    fn new(scope: BudgetScope, spent: f64, limit: f64) -> Self {
        let ratio = if limit > 0.0 {
            spent / limit
        } else if spent > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        Self {
            scope,
            spent,
            limit,
            ratio,
        }
    }

    /// Whether spend is strictly above the ceiling
    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        self.spent > self.limit
    }
}

/// Result of a budget evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// One entry per configured ceiling
    pub checks: Vec<BudgetCheck>,
    /// Human-readable warnings for ceilings at or above the alert threshold
    pub warnings: Vec<String>,
}

impl BudgetStatus {
    /// Check for one scope, if that ceiling is configured
    #[must_use]
    pub fn check(&self, scope: BudgetScope) -> Option<&BudgetCheck> {
        self.checks.iter().find(|c| c.scope == scope)
    }
}

/// Measure the session, today and this month against the ceilings.
///
/// Day and month spend include the running session, which is not folded
/// into the ledgers until it ends.
pub(crate) fn evaluate(
    budgets: &Budgets,
    ledger: &CostLedger,
    session: Option<&Session>,
    now: DateTime<Utc>,
    alert_threshold: f64,
) -> BudgetStatus {
    let session_spent = session.map(|s| s.costs.total).unwrap_or(0.0);
    let mut status = BudgetStatus::default();

    let scopes = [
        (BudgetScope::PerBook, budgets.per_book, session_spent),
        (
            BudgetScope::Daily,
            budgets.daily,
            ledger.spent_on_day(now) + session_spent,
        ),
        (
            BudgetScope::Monthly,
            budgets.monthly,
            ledger.spent_in_month(now) + session_spent,
        ),
    ];

    for (scope, limit, spent) in scopes {
        let Some(limit) = limit else { continue };
        let check = BudgetCheck::new(scope, spent, limit);
        if check.ratio >= alert_threshold {
            status.warnings.push(format!(
                "{} budget at {:.0}%: ${:.4} of ${:.2}",
                scope,
                check.ratio * 100.0,
                spent,
                limit
            ));
        }
        status.checks.push(check);
    }

    status
}

/// Log warnings and turn a per-book overrun into an error.
///
/// Daily and monthly overruns only warn; they never stop a running book.
pub(crate) fn enforce(status: BudgetStatus) -> Result<BudgetStatus> {
    for warning in &status.warnings {
        warn!(warning = %warning, "Budget alert");
    }

    if let Some(check) = status.check(BudgetScope::PerBook) {
        if check.is_exceeded() {
            warn!(
                spent = check.spent,
                limit = check.limit,
                "Per-book budget exceeded, aborting session"
            );
            return Err(Error::BudgetExceeded {
                spent: check.spent,
                limit: check.limit,
            });
        }
    }

    Ok(status)
}
