//! Cost tracker configuration

use crate::error::Result;
use crate::pricing::PricingTable;
use crate::store::JsonFileStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default share of a ceiling at which warnings start
pub const DEFAULT_ALERT_THRESHOLD: f64 = 0.8;

/// Cost tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Share of any ceiling (0.0-1.0) at which budget warnings are logged
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    /// Directory holding `costs.json` and `budgets.json` (default `~/.folio/costs`)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// JSON pricing table replacing the built-in rates
    #[serde(default)]
    pub pricing_file: Option<PathBuf>,
}

fn default_alert_threshold() -> f64 {
    DEFAULT_ALERT_THRESHOLD
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            data_dir: None,
            pricing_file: None,
        }
    }
}

impl CostConfig {
    /// Set the data directory
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the alert threshold
    #[must_use]
    pub fn with_alert_threshold(mut self, threshold: f64) -> Self {
        self.alert_threshold = threshold;
        self
    }

    /// Pricing table: the configured file if any, otherwise built-in rates
    pub fn pricing(&self) -> Result<PricingTable> {
        match &self.pricing_file {
            Some(path) => PricingTable::from_json_file(path),
            None => Ok(PricingTable::default_table()),
        }
    }

    /// File store for the configured data directory
    #[must_use]
    pub fn store(&self) -> JsonFileStore {
        match &self.data_dir {
            Some(dir) => JsonFileStore::with_path(dir),
            None => JsonFileStore::new(),
        }
    }
}
