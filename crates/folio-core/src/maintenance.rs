//! Background maintenance for the rate limiter
//!
//! Two fixed-interval tickers keep the usage windows bounded and let
//! throttled services recover while no calls arrive:
//! - cleanup: purge expired window entries (default every 60s)
//! - recheck: re-evaluate throttle levels (default every 10s)

use crate::config::MaintenanceConfig;
use crate::utils::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Owner of the limiter's maintenance tickers
#[derive(Debug, Clone)]
pub struct Maintenance {
    limiter: Arc<RateLimiter>,
    cleanup_interval: Duration,
    recheck_interval: Duration,
}

impl Maintenance {
    /// Create maintenance for `limiter` with the given intervals
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>, config: &MaintenanceConfig) -> Self {
        Self {
            limiter,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
            recheck_interval: Duration::from_secs(config.recheck_interval_secs.max(1)),
        }
    }

    /// Purge expired usage entries once
    pub fn tick_cleanup(&self) -> usize {
        let removed = self.limiter.cleanup();
        debug!(removed = removed, "Maintenance cleanup pass");
        removed
    }

    /// Re-evaluate throttle levels once
    pub fn tick_recheck(&self) {
        self.limiter.evaluate_all();
    }

    /// Run both tickers until `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(
            cleanup_secs = self.cleanup_interval.as_secs(),
            recheck_secs = self.recheck_interval.as_secs(),
            "Governance maintenance started"
        );

        tokio::spawn(async move {
            let mut cleanup = tokio::time::interval(self.cleanup_interval);
            let mut recheck = tokio::time::interval(self.recheck_interval);
            cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
            recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Both intervals fire immediately; skip that first tick
            cleanup.tick().await;
            recheck.tick().await;

            loop {
                tokio::select! {
                    _ = cleanup.tick() => {
                        self.tick_cleanup();
                    }
                    _ = recheck.tick() => {
                        self.tick_recheck();
                    }
                    _ = shutdown.cancelled() => {
                        info!("Governance maintenance shutting down");
                        break;
                    }
                }
            }
        })
    }
}
