//! EventBus - broadcast channel for governance events.
//!
//! The rate limiter and circuit breakers publish state changes here so that
//! dashboards, loggers and the quota webhook can observe them independently.

use crate::config::ServiceLimits;
use crate::utils::{CircuitState, UsageCounts};
use serde::Serialize;
use tokio::sync::broadcast;

/// Events emitted by the governance layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum GovernanceEvent {
    /// A service crossed the slowdown threshold or its delay changed
    #[serde(rename = "service:throttled")]
    ServiceThrottled {
        /// Service name
        service: String,
        /// Highest window usage share
        usage: f64,
        /// Advisory delay in milliseconds
        delay: u64,
    },
    /// A service crossed the pause threshold
    #[serde(rename = "service:paused")]
    ServicePaused {
        /// Service name
        service: String,
        /// Highest window usage share
        usage: f64,
    },
    /// A throttled service fell back under the slowdown threshold
    #[serde(rename = "service:recovered")]
    ServiceRecovered {
        /// Service name
        service: String,
        /// Highest window usage share
        usage: f64,
    },
    /// A quota threshold was crossed for the first time today
    #[serde(rename = "quota:alert")]
    QuotaAlert {
        /// Service name
        service: String,
        /// Highest window usage share
        usage: f64,
        /// Threshold that was crossed
        threshold: f64,
        /// Configured ceilings
        limits: ServiceLimits,
        /// Usage counts at the time of the alert
        #[serde(rename = "currentUsage")]
        current_usage: UsageCounts,
    },
    /// A circuit breaker changed state
    #[serde(rename = "circuit:state_changed")]
    CircuitStateChanged {
        /// Breaker name
        name: String,
        /// Previous state
        from: CircuitState,
        /// New state
        to: CircuitState,
    },
}

impl GovernanceEvent {
    /// Wire name of the event
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceThrottled { .. } => "service:throttled",
            Self::ServicePaused { .. } => "service:paused",
            Self::ServiceRecovered { .. } => "service:recovered",
            Self::QuotaAlert { .. } => "quota:alert",
            Self::CircuitStateChanged { .. } => "circuit:state_changed",
        }
    }

    /// Service or breaker the event is about
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Self::ServiceThrottled { service, .. }
            | Self::ServicePaused { service, .. }
            | Self::ServiceRecovered { service, .. }
            | Self::QuotaAlert { service, .. } => service,
            Self::CircuitStateChanged { name, .. } => name,
        }
    }
}

/// Broadcast-based event bus for governance events.
///
/// Slow subscribers miss events (lagged) rather than blocking the publisher,
/// so publishing from inside the limiter's critical section never waits.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GovernanceEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all active subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: GovernanceEvent) -> usize {
        // send() errors when nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of active subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
