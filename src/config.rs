//! Application configuration

use folio_core::GovernanceConfig;
use folio_cost::CostConfig;
use serde::Deserialize;

/// Complete configuration of the `folio` binary
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Rate limits, throttling, breakers, alerts and maintenance
    #[serde(default)]
    pub governance: GovernanceConfig,
    /// Cost tracker settings
    #[serde(default)]
    pub costs: CostConfig,
}
