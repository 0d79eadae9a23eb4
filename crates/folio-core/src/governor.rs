//! Governor - the governance facade handed to pipeline workers
//!
//! One call through the governor runs the full admission path:
//! reserve a request slot, honour any advisory delay, run the call inside
//! the service's circuit breaker, then report tokens to the limiter and
//! spend to the cost tracker.

use crate::alerts::QuotaAlertWebhook;
use crate::config::{GovernanceConfig, MaintenanceConfig};
use crate::error::{Error, Result};
use crate::event_bus::EventBus;
use crate::maintenance::Maintenance;
use crate::utils::{
    CircuitBreakerRegistry, CircuitSnapshot, RateLimiter, ServiceStatus, UsageKind,
};
use folio_cost::{Clock, CostTracker, SpendingSummary};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Billable usage reported by a finished call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallUsage {
    /// Nothing to bill
    None,
    /// Text generation
    Llm {
        /// Model name
        model: String,
        /// Prompt tokens
        input_tokens: u64,
        /// Completion tokens
        output_tokens: u64,
    },
    /// Web searches
    Search {
        /// Model or product name
        model: String,
        /// Number of searches
        count: u64,
    },
    /// Generated images
    Image {
        /// Model name
        model: String,
        /// Number of images
        count: u64,
    },
}

/// A call result together with the usage it consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metered<T> {
    /// The call's value
    pub value: T,
    /// What to bill for it
    pub usage: CallUsage,
}

impl<T> Metered<T> {
    /// Value with no billable usage
    pub fn unmetered(value: T) -> Self {
        Self {
            value,
            usage: CallUsage::None,
        }
    }

    /// Value from a text generation call
    pub fn llm(value: T, model: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            value,
            usage: CallUsage::Llm {
                model: model.into(),
                input_tokens,
                output_tokens,
            },
        }
    }

    /// Value from `count` searches
    pub fn search(value: T, model: impl Into<String>, count: u64) -> Self {
        Self {
            value,
            usage: CallUsage::Search {
                model: model.into(),
                count,
            },
        }
    }

    /// Value from `count` generated images
    pub fn image(value: T, model: impl Into<String>, count: u64) -> Self {
        Self {
            value,
            usage: CallUsage::Image {
                model: model.into(),
                count,
            },
        }
    }
}

/// Dashboard snapshot of the whole governance layer
#[derive(Debug, Clone, Serialize)]
pub struct GovernanceStatus {
    /// Rate limiter view per service
    pub services: Vec<ServiceStatus>,
    /// Breaker view per dependency
    pub circuits: Vec<CircuitSnapshot>,
    /// Spend so far
    pub spending: SpendingSummary,
}

/// Shared governance context for pipeline workers
#[derive(Debug, Clone)]
pub struct Governor {
    limiter: Arc<RateLimiter>,
    breakers: Arc<CircuitBreakerRegistry>,
    costs: Arc<CostTracker>,
    events: EventBus,
    maintenance: MaintenanceConfig,
    webhook_url: Option<String>,
}

impl Governor {
    /// Assemble a governor from already built parts
    #[must_use]
    pub fn new(
        limiter: Arc<RateLimiter>,
        breakers: Arc<CircuitBreakerRegistry>,
        costs: Arc<CostTracker>,
    ) -> Self {
        let events = limiter.events().clone();
        Self {
            limiter,
            breakers,
            costs,
            events,
            maintenance: MaintenanceConfig::default(),
            webhook_url: None,
        }
    }

    /// Build every component from configuration
    pub fn from_config(
        config: &GovernanceConfig,
        costs: Arc<CostTracker>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        validate(config)?;

        let events = EventBus::new(config.event_capacity);
        let limiter = RateLimiter::new(config.rate_limits.clone())
            .with_throttle(config.throttle)
            .with_alert_thresholds(config.alerts.thresholds.clone())
            .with_clock(Arc::clone(&clock))
            .with_event_bus(events.clone());
        let breakers = CircuitBreakerRegistry::from_config(&config.breakers)
            .with_clock(clock)
            .with_event_bus(events.clone());

        Ok(Self {
            limiter: Arc::new(limiter),
            breakers: Arc::new(breakers),
            costs,
            events,
            maintenance: config.maintenance,
            webhook_url: config.alerts.webhook_url.clone(),
        })
    }

    /// The shared rate limiter
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The breaker registry
    #[must_use]
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// The cost tracker
    #[must_use]
    pub fn costs(&self) -> &Arc<CostTracker> {
        &self.costs
    }

    /// Event bus all components publish on
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run one external call for `service` under full governance.
    ///
    /// An open circuit and rate limit denials come back without running `op`
    /// or taking a request slot. The slot reserved for a call that fails or
    /// times out is given back. A per-book budget overrun is returned after
    /// the cost is recorded.
    pub async fn call<F, Fut, T, E>(&self, service: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Metered<T>, E>>,
        E: std::fmt::Display,
    {
        let breaker = self.breakers.get_or_create(service);
        if let Some(open) = breaker.rejection::<E>() {
            debug!(service = %service, "Call rejected by open circuit");
            return Err(Error::from_circuit(service, open));
        }

        let decision = self.limiter.acquire(service, UsageKind::Request, 1);
        if !decision.allowed {
            debug!(service = %service, decision = %decision, "Call denied by rate limiter");
            return Err(Error::RateLimited(decision));
        }
        if let Some(delay) = decision.delay().filter(|d| !d.is_zero()) {
            debug!(service = %service, delay_ms = delay.as_millis() as u64, "Throttling call");
            tokio::time::sleep(delay).await;
        }

        let metered = match breaker.fire(op).await {
            Ok(metered) => metered,
            Err(err) => {
                self.limiter.release(service, UsageKind::Request, 1);
                return Err(Error::from_circuit(service, err));
            }
        };

        self.commit(service, &metered.usage)?;
        Ok(metered.value)
    }

    /// Report finished usage to the limiter and the cost tracker.
    ///
    /// Returns the recorded cost, `None` when nothing was priced.
    pub fn commit(&self, service: &str, usage: &CallUsage) -> Result<Option<f64>> {
        let cost = match usage {
            CallUsage::None => None,
            CallUsage::Llm {
                model,
                input_tokens,
                output_tokens,
            } => {
                self.limiter.record_usage(
                    service,
                    UsageKind::Token,
                    input_tokens.saturating_add(*output_tokens),
                );
                self.costs
                    .track_llm_usage(service, model, *input_tokens, *output_tokens)?
            }
            CallUsage::Search { model, count } => {
                self.costs.track_search_usage(service, model, *count)?
            }
            CallUsage::Image { model, count } => {
                self.costs.track_image_usage(service, model, *count)?
            }
        };
        Ok(cost)
    }

    /// Snapshot of limiter, breakers and spend
    #[must_use]
    pub fn status(&self) -> GovernanceStatus {
        GovernanceStatus {
            services: self.limiter.get_all_status(),
            circuits: self.breakers.snapshot(),
            spending: self.costs.get_current_spending(),
        }
    }

    /// Start maintenance and, when configured, the alert webhook
    pub fn spawn_background(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let maintenance = Maintenance::new(Arc::clone(&self.limiter), &self.maintenance);
        let mut handles = vec![maintenance.spawn(shutdown.child_token())];
        if let Some(url) = &self.webhook_url {
            let webhook = QuotaAlertWebhook::new(url.clone());
            handles.push(webhook.spawn(&self.events, shutdown.child_token()));
        }
        handles
    }
}

fn validate(config: &GovernanceConfig) -> Result<()> {
    let throttle = &config.throttle;
    if !(0.0..=1.0).contains(&throttle.slowdown_threshold)
        || throttle.pause_threshold <= throttle.slowdown_threshold
    {
        return Err(Error::Configuration(format!(
            "throttle thresholds must satisfy 0 <= slowdown ({}) < pause ({})",
            throttle.slowdown_threshold, throttle.pause_threshold
        )));
    }
    if let Some(bad) = config
        .alerts
        .thresholds
        .iter()
        .find(|t| !t.is_finite() || **t <= 0.0)
    {
        return Err(Error::Configuration(format!(
            "alert threshold must be positive, got {bad}"
        )));
    }
    if let Some(url) = &config.alerts.webhook_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Configuration(format!(
                "webhook_url must be an http(s) URL, got {url}"
            )));
        }
    }
    for (service, limits) in &config.rate_limits {
        if limits.requests.is_empty() && limits.tokens.is_empty() {
            warn!(service = %service, "Service configured without any limit");
        }
    }
    Ok(())
}
