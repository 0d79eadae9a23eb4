//! Spending summaries and session reports

use crate::ledger::{Budgets, CostLedger};
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Money left under each ceiling (`None` when no ceiling is set)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingBudget {
    /// Left today
    pub daily: Option<f64>,
    /// Left this month
    pub monthly: Option<f64>,
    /// Left for the running book
    pub per_book: Option<f64>,
}

/// Spend at a glance. Day, month and total include the running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingSummary {
    /// When the summary was taken
    pub as_of: DateTime<Utc>,
    /// Spent today
    pub today: f64,
    /// Spent this month
    pub month: f64,
    /// Spent all time
    pub total: f64,
    /// Running session id
    pub session_id: Option<String>,
    /// Running session spend
    pub session: Option<f64>,
    /// Configured ceilings
    pub budgets: Budgets,
    /// Headroom under each ceiling
    pub remaining: RemainingBudget,
}

pub(crate) fn spending_summary(
    ledger: &CostLedger,
    budgets: &Budgets,
    session: Option<&Session>,
    now: DateTime<Utc>,
) -> SpendingSummary {
    let session_spent = session.map(|s| s.costs.total);
    let running = session_spent.unwrap_or(0.0);
    let today = ledger.spent_on_day(now) + running;
    let month = ledger.spent_in_month(now) + running;

    SpendingSummary {
        as_of: now,
        today,
        month,
        total: ledger.total + running,
        session_id: session.map(|s| s.id.clone()),
        session: session_spent,
        budgets: *budgets,
        remaining: RemainingBudget {
            daily: budgets.daily.map(|limit| limit - today),
            monthly: budgets.monthly.map(|limit| limit - month),
            per_book: budgets.per_book.map(|limit| limit - running),
        },
    }
}

/// Text report for a finished session
#[must_use]
pub fn format_session_report(
    session: &Session,
    ledger: &CostLedger,
    budgets: &Budgets,
    now: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    output.push_str("📊 **Book Cost Report**\n\n");
    output.push_str(&format!("Session: {}\n", session.id));
    output.push_str(&format!(
        "Started: {}\n",
        session.start_time.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!(
        "Duration: {}m {}s\n",
        session.duration(now).num_minutes(),
        session.duration(now).num_seconds() % 60
    ));

    output.push_str("\n**Costs:**\n");
    output.push_str(&format!("• LLM: ${:.4}\n", session.costs.llm));
    output.push_str(&format!("• Search: ${:.4}\n", session.costs.search));
    output.push_str(&format!("• Images: ${:.4}\n", session.costs.images));
    output.push_str(&format!("• Total: ${:.4}\n", session.costs.total));

    output.push_str("\n**Usage:**\n");
    output.push_str(&format!(
        "• Tokens: {} input, {} output\n",
        session.usage.tokens.input, session.usage.tokens.output
    ));
    output.push_str(&format!("• Searches: {}\n", session.usage.searches));
    output.push_str(&format!("• Images: {}\n", session.usage.images));

    if let Some(limit) = budgets.per_book {
        output.push_str(&format!(
            "\nPer-book budget: ${:.4} of ${:.2} ({:.0}%)\n",
            session.costs.total,
            limit,
            if limit > 0.0 {
                session.costs.total / limit * 100.0
            } else {
                0.0
            }
        ));
    }

    output.push_str("\n**Running Totals:**\n");
    output.push_str(&format!("• Today: ${:.4}\n", ledger.spent_on_day(now)));
    output.push_str(&format!("• This Month: ${:.4}\n", ledger.spent_in_month(now)));
    output.push_str(&format!("• All Time: ${:.4}\n", ledger.total));

    output
}
