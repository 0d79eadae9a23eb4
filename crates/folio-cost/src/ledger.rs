//! Persisted spend ledgers and budget ceilings

use crate::error::Result;
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ledger key for a calendar day (`YYYY-MM-DD`, UTC)
#[must_use]
pub fn day_key(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d").to_string()
}

/// Ledger key for a calendar month (`YYYY-MM`, UTC)
#[must_use]
pub fn month_key(time: DateTime<Utc>) -> String {
    time.format("%Y-%m").to_string()
}

/// Spend history: finished sessions plus daily, monthly and all-time totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostLedger {
    /// Finished sessions by id
    #[serde(default)]
    pub sessions: BTreeMap<String, Session>,
    /// Spend per day (`YYYY-MM-DD`)
    #[serde(default)]
    pub daily: BTreeMap<String, f64>,
    /// Spend per month (`YYYY-MM`)
    #[serde(default)]
    pub monthly: BTreeMap<String, f64>,
    /// All-time spend
    #[serde(default)]
    pub total: f64,
}

impl CostLedger {
    /// Fold a finished session into the ledgers, dated at `ended_at`
    pub fn fold_session(&mut self, session: Session, ended_at: DateTime<Utc>) {
        let cost = session.costs.total;
        *self.daily.entry(day_key(ended_at)).or_insert(0.0) += cost;
        *self.monthly.entry(month_key(ended_at)).or_insert(0.0) += cost;
        self.total += cost;
        self.sessions.insert(session.id.clone(), session);
    }

    /// Spend recorded for the day containing `time`
    #[must_use]
    pub fn spent_on_day(&self, time: DateTime<Utc>) -> f64 {
        self.daily.get(&day_key(time)).copied().unwrap_or(0.0)
    }

    /// Spend recorded for the month containing `time`
    #[must_use]
    pub fn spent_in_month(&self, time: DateTime<Utc>) -> f64 {
        self.monthly.get(&month_key(time)).copied().unwrap_or(0.0)
    }

    /// Reload a ledger from its JSON export
    pub fn from_json_export(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Money ceilings (USD). `None` means no ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budgets {
    /// Ceiling per calendar day
    #[serde(default)]
    pub daily: Option<f64>,
    /// Ceiling per calendar month
    #[serde(default)]
    pub monthly: Option<f64>,
    /// Ceiling per book (session). Exceeding it aborts the session.
    #[serde(default)]
    pub per_book: Option<f64>,
}

impl Budgets {
    /// Set the daily ceiling
    #[must_use]
    pub fn with_daily(mut self, limit: f64) -> Self {
        self.daily = Some(limit);
        self
    }

    /// Set the monthly ceiling
    #[must_use]
    pub fn with_monthly(mut self, limit: f64) -> Self {
        self.monthly = Some(limit);
        self
    }

    /// Set the per-book ceiling
    #[must_use]
    pub fn with_per_book(mut self, limit: f64) -> Self {
        self.per_book = Some(limit);
        self
    }
}
