//! Cost Tracker - per-session spend accounting with budget enforcement
//!
//! One session runs at a time per tracker. Track calls price the usage from
//! the pricing table, append it to the session breakdown and re-check the
//! budgets; only the per-book ceiling is a hard stop.

use crate::analytics::{self, AnalyticsPeriod, CostAnalytics, ExportFormat, RoiReport};
use crate::budget::{self, BudgetStatus};
use crate::clock::{Clock, SystemClock};
use crate::config::CostConfig;
use crate::error::{Error, Result};
use crate::ledger::{Budgets, CostLedger};
use crate::pricing::{PriceSchedule, PricingTable};
use crate::report::{self, SpendingSummary};
use crate::session::{new_session_id, CostCategory, Session, UsageRecord};
use crate::store::LedgerStore;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct TrackerState {
    ledger: CostLedger,
    budgets: Budgets,
    current: Option<Session>,
}

/// Spend accounting shared by all pipeline workers
pub struct CostTracker {
    pricing: RwLock<PricingTable>,
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    alert_threshold: f64,
    state: Mutex<TrackerState>,
    // Held from snapshot to finished write so saves land in order
    persist: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for CostTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostTracker")
            .field("alert_threshold", &self.alert_threshold)
            .finish_non_exhaustive()
    }
}

impl CostTracker {
    /// Open a tracker over `store`, loading the persisted ledger and budgets
    pub async fn open(
        store: Arc<dyn LedgerStore>,
        pricing: PricingTable,
        alert_threshold: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let ledger = store.load_ledger().await?;
        let budgets = store.load_budgets().await?;

        Ok(Self {
            pricing: RwLock::new(pricing),
            store,
            clock,
            alert_threshold,
            state: Mutex::new(TrackerState {
                ledger,
                budgets,
                current: None,
            }),
            persist: tokio::sync::Mutex::new(()),
        })
    }

    /// Open a tracker from configuration (file store, configured pricing)
    pub async fn from_config(config: &CostConfig) -> Result<Self> {
        Self::open(
            Arc::new(config.store()),
            config.pricing()?,
            config.alert_threshold,
            Arc::new(SystemClock),
        )
        .await
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Start a session. A fresh id is generated when `id` is `None`.
    pub fn start_session(
        &self,
        id: Option<String>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<String> {
        let mut state = self.state();
        if let Some(current) = &state.current {
            return Err(Error::SessionAlreadyActive(current.id.clone()));
        }

        let id = id.unwrap_or_else(new_session_id);
        state.current = Some(Session::new(id.clone(), self.clock.now(), metadata));
        info!(session_id = %id, "Cost session started");
        Ok(id)
    }

    /// Snapshot of the running session
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.state().current.clone()
    }

    /// End the running session: fold it into the ledgers, persist, and
    /// return a text report.
    pub async fn end_session(&self) -> Result<String> {
        let _persist = self.persist.lock().await;
        let now = self.clock.now();
        let (report, ledger, id, cost) = {
            let mut state = self.state();
            let mut session = state.current.take().ok_or(Error::NoActiveSession)?;
            session.end_time = Some(now);

            let id = session.id.clone();
            let cost = session.costs.total;
            let snapshot = session.clone();
            state.ledger.fold_session(session, now);
            let report =
                report::format_session_report(&snapshot, &state.ledger, &state.budgets, now);
            (report, state.ledger.clone(), id, cost)
        };

        self.store.save_ledger(&ledger).await?;
        info!(session_id = %id, cost = cost, total = ledger.total, "Cost session ended");
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    /// Track a text generation call.
    ///
    /// Returns the cost, or `None` when the model has no price (the call is
    /// skipped with a warning).
    pub fn track_llm_usage(
        &self,
        service: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<Option<f64>> {
        let cost = self.price(service, model, |s| s.token_cost(input_tokens, output_tokens));
        let Some(cost) = cost else {
            return Ok(None);
        };

        self.track(UsageRecord {
            timestamp: self.clock.now(),
            category: CostCategory::Llm,
            service: service.to_string(),
            model: model.to_string(),
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            count: None,
            cost,
        })
    }

    /// Track `count` search requests
    pub fn track_search_usage(&self, service: &str, model: &str, count: u64) -> Result<Option<f64>> {
        self.track_units(CostCategory::Search, service, model, count)
    }

    /// Track `count` generated images
    pub fn track_image_usage(&self, service: &str, model: &str, count: u64) -> Result<Option<f64>> {
        self.track_units(CostCategory::Images, service, model, count)
    }

    fn track_units(
        &self,
        category: CostCategory,
        service: &str,
        model: &str,
        count: u64,
    ) -> Result<Option<f64>> {
        let cost = self.price(service, model, |s| match category {
            CostCategory::Search => s.search_cost(count),
            CostCategory::Images => s.image_cost(count),
            CostCategory::Llm => None,
        });
        let Some(cost) = cost else {
            return Ok(None);
        };

        self.track(UsageRecord {
            timestamp: self.clock.now(),
            category,
            service: service.to_string(),
            model: model.to_string(),
            input_tokens: None,
            output_tokens: None,
            count: Some(count),
            cost,
        })
    }

    fn price(
        &self,
        service: &str,
        model: &str,
        cost_of: impl FnOnce(&PriceSchedule) -> Option<f64>,
    ) -> Option<f64> {
        let pricing = self.pricing.read().unwrap_or_else(|e| e.into_inner());
        let cost = pricing.get(service, model).and_then(cost_of);
        if cost.is_none() {
            warn!(
                service = %service,
                model = %model,
                "No matching price for usage, cost not recorded"
            );
        }
        cost
    }

    fn track(&self, record: UsageRecord) -> Result<Option<f64>> {
        let cost = record.cost;
        let status = {
            let mut state = self.state();
            let session = state.current.as_mut().ok_or(Error::NoActiveSession)?;
            debug!(
                session_id = %session.id,
                service = %record.service,
                model = %record.model,
                category = %record.category,
                cost = cost,
                "Usage tracked"
            );
            session.record(record);
            self.evaluate_budget(&state)
        };

        budget::enforce(status)?;
        Ok(Some(cost))
    }

    // ------------------------------------------------------------------------
    // Budgets
    // ------------------------------------------------------------------------

    fn evaluate_budget(&self, state: &TrackerState) -> BudgetStatus {
        budget::evaluate(
            &state.budgets,
            &state.ledger,
            state.current.as_ref(),
            self.clock.now(),
            self.alert_threshold,
        )
    }

    /// Compare spend against the ceilings.
    ///
    /// Fails with [`Error::BudgetExceeded`] only when the running session is
    /// strictly above the per-book ceiling.
    pub fn check_budget(&self) -> Result<BudgetStatus> {
        let status = {
            let state = self.state();
            self.evaluate_budget(&state)
        };
        budget::enforce(status)
    }

    /// Configured ceilings
    #[must_use]
    pub fn budgets(&self) -> Budgets {
        self.state().budgets
    }

    /// Replace and persist the ceilings
    pub async fn set_budgets(&self, budgets: Budgets) -> Result<()> {
        let _persist = self.persist.lock().await;
        for (name, value) in [
            ("daily", budgets.daily),
            ("monthly", budgets.monthly),
            ("perBook", budgets.per_book),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::InvalidInput(format!(
                        "{name} budget must be a non-negative number, got {v}"
                    )));
                }
            }
        }

        self.state().budgets = budgets;
        self.store.save_budgets(&budgets).await?;
        info!(?budgets, "Budgets updated");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Pricing
    // ------------------------------------------------------------------------

    /// Snapshot of the pricing table
    #[must_use]
    pub fn pricing(&self) -> PricingTable {
        self.pricing.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Set the price of one model
    pub fn update_pricing(&self, service: &str, model: &str, schedule: PriceSchedule) {
        self.pricing
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set_price(service, model, schedule);
    }

    /// Replace the whole pricing table
    pub fn replace_pricing(&self, table: PricingTable) {
        *self.pricing.write().unwrap_or_else(|e| e.into_inner()) = table;
    }

    // ------------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------------

    /// Snapshot of the persisted ledger (running session excluded)
    #[must_use]
    pub fn ledger(&self) -> CostLedger {
        self.state().ledger.clone()
    }

    /// Today, this month, all time and the running session
    #[must_use]
    pub fn get_current_spending(&self) -> SpendingSummary {
        let state = self.state();
        report::spending_summary(
            &state.ledger,
            &state.budgets,
            state.current.as_ref(),
            self.clock.now(),
        )
    }

    /// Aggregate finished sessions over a period
    #[must_use]
    pub fn get_analytics(&self, period: AnalyticsPeriod) -> CostAnalytics {
        analytics::analyze(&self.state().ledger, period, self.clock.now())
    }

    /// Return on investment at the historical average cost per book
    pub fn calculate_roi(&self, book_price: f64, units_sold: u64) -> Result<RoiReport> {
        analytics::calculate_roi(&self.state().ledger, book_price, units_sold)
    }

    /// Serialize the ledger
    pub fn export_cost_data(&self, format: ExportFormat) -> Result<String> {
        analytics::export(&self.state().ledger, format)
    }
}

#[cfg(test)]
mod tests;
