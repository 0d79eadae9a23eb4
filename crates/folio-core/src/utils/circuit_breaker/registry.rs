//! Circuit breaker registry, one breaker per named dependency

use super::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot};
use crate::config::BreakersConfig;
use crate::event_bus::EventBus;
use dashmap::DashMap;
use folio_cost::{Clock, SystemClock};
use std::collections::HashMap;
use std::sync::Arc;

/// Collection of circuit breakers for the external services
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers all use `default_config`
    #[must_use]
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            overrides: HashMap::new(),
            clock: Arc::new(SystemClock),
            events: None,
        }
    }

    /// Create a registry from config settings
    #[must_use]
    pub fn from_config(config: &BreakersConfig) -> Self {
        let mut registry = Self::new(config.default.into());
        for (name, settings) in &config.services {
            registry = registry.with_override(name.clone(), (*settings).into());
        }
        registry
    }

    /// Use `config` for the breaker named `name`
    #[must_use]
    pub fn with_override(mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    /// Clock handed to every breaker
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Event bus handed to every breaker
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Configuration a breaker named `name` gets
    #[must_use]
    pub fn config_for(&self, name: &str) -> CircuitBreakerConfig {
        self.overrides
            .get(name)
            .copied()
            .unwrap_or(self.default_config)
    }

    /// Get or create the breaker for a dependency
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let mut breaker = CircuitBreaker::new(name, self.config_for(name))
                    .with_clock(Arc::clone(&self.clock));
                if let Some(events) = &self.events {
                    breaker = breaker.with_event_bus(events.clone());
                }
                Arc::new(breaker)
            })
            .clone()
    }

    /// Get an existing breaker
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Get all circuit breaker names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshots of every breaker, sorted by name
    #[must_use]
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut stats: Vec<CircuitSnapshot> =
            self.breakers.iter().map(|e| e.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Reset all circuit breakers
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
