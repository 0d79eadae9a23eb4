//! Folio Cost - spend accounting for ebook pipelines
//!
//! This crate prices external service usage and enforces budgets:
//! - Pricing: injectable service x model price schedules
//! - Sessions: one accumulator per book, with an ordered breakdown
//! - Ledgers: persisted daily, monthly and all-time totals
//! - Budgets: daily/monthly warnings and a hard per-book stop
//! - Reporting: spending summary, analytics, ROI and export

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analytics;
pub mod budget;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod pricing;
pub mod report;
pub mod session;
pub mod store;
pub mod tracker;

pub use analytics::{AnalyticsPeriod, CostAnalytics, ExportFormat, RoiReport};
pub use budget::{BudgetCheck, BudgetScope, BudgetStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CostConfig;
pub use error::{Error, Result};
pub use ledger::{day_key, month_key, Budgets, CostLedger};
pub use pricing::{PriceSchedule, PricingTable};
pub use report::{format_session_report, RemainingBudget, SpendingSummary};
pub use session::{
    new_session_id, CostCategory, Session, SessionCosts, SessionUsage, TokenUsage, UsageRecord,
};
pub use store::{JsonFileStore, LedgerStore, MemoryLedgerStore};
pub use tracker::CostTracker;
