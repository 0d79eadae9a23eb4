//! CLI command: `folio budget`

use anyhow::Result;
use clap::Subcommand;
use folio_cost::{Budgets, CostTracker};

#[derive(Subcommand, Debug)]
pub enum BudgetAction {
    /// Show the configured ceilings
    Show,
    /// Change ceilings; unspecified ones stay as they are
    Set {
        /// Daily ceiling (USD)
        #[arg(long)]
        daily: Option<f64>,
        /// Monthly ceiling (USD)
        #[arg(long)]
        monthly: Option<f64>,
        /// Per-book ceiling (USD), the only hard stop
        #[arg(long)]
        per_book: Option<f64>,
        /// Remove the daily ceiling
        #[arg(long, conflicts_with = "daily")]
        clear_daily: bool,
        /// Remove the monthly ceiling
        #[arg(long, conflicts_with = "monthly")]
        clear_monthly: bool,
        /// Remove the per-book ceiling
        #[arg(long, conflicts_with = "per_book")]
        clear_per_book: bool,
    },
}

/// Run the budget subcommand.
pub async fn run(tracker: &CostTracker, action: BudgetAction) -> Result<()> {
    match action {
        BudgetAction::Show => {
            print_budgets(&tracker.budgets());
            Ok(())
        }
        BudgetAction::Set {
            daily,
            monthly,
            per_book,
            clear_daily,
            clear_monthly,
            clear_per_book,
        } => {
            let current = tracker.budgets();
            let budgets = Budgets {
                daily: merge(current.daily, daily, clear_daily),
                monthly: merge(current.monthly, monthly, clear_monthly),
                per_book: merge(current.per_book, per_book, clear_per_book),
            };
            tracker.set_budgets(budgets).await?;
            println!("✅ Budgets updated");
            print_budgets(&budgets);
            Ok(())
        }
    }
}

fn merge(current: Option<f64>, new: Option<f64>, clear: bool) -> Option<f64> {
    if clear {
        None
    } else {
        new.or(current)
    }
}

fn print_budgets(budgets: &Budgets) {
    let show = |v: Option<f64>| v.map_or_else(|| "none".to_string(), |v| format!("${v:.2}"));
    println!();
    println!("  Daily:     {}", show(budgets.daily));
    println!("  Monthly:   {}", show(budgets.monthly));
    println!("  Per book:  {}", show(budgets.per_book));
    println!();
}

#[cfg(test)]
mod tests;
