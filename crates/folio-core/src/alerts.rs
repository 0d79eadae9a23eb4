//! Quota alert webhook
//!
//! Forwards `quota:alert` events from the [`EventBus`] to an operator URL
//! as JSON POSTs. Delivery failures are logged and never reach the caller
//! that triggered the alert.

use crate::error::{Error, Result};
use crate::event_bus::{EventBus, GovernanceEvent};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// HTTP request timeout in seconds
const HTTP_TIMEOUT_SECS: u64 = 10;

/// Posts quota alerts to a webhook URL
#[derive(Debug, Clone)]
pub struct QuotaAlertWebhook {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl QuotaAlertWebhook {
    /// Create a webhook for `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
        }
    }

    /// Override the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Target URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `event` if it is a quota alert.
    ///
    /// Returns `Ok(false)` for other events.
    pub async fn deliver(&self, event: &GovernanceEvent) -> Result<bool> {
        if !matches!(event, GovernanceEvent::QuotaAlert { .. }) {
            return Ok(false);
        }

        let response = self
            .client
            .post(&self.url)
            .json(event)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Webhook(e.to_string()))?;

        if response.status().is_success() {
            debug!(url = %self.url, service = %event.subject(), "Quota alert delivered");
            Ok(true)
        } else {
            Err(Error::Webhook(format!("HTTP {}", response.status())))
        }
    }

    /// Forward alerts from `events` until `shutdown` is cancelled
    pub fn spawn(self, events: &EventBus, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut rx = events.subscribe();
        info!(url = %self.url, "Quota alert webhook started");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Ok(event) => {
                            if let Err(e) = self.deliver(&event).await {
                                warn!(url = %self.url, error = %e, "Failed to deliver quota alert");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped = skipped, "Quota alert webhook lagged behind event bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = shutdown.cancelled() => {
                        info!("Quota alert webhook shutting down");
                        break;
                    }
                }
            }
        })
    }
}
