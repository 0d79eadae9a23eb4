//! Pricing Table - vendor price schedules
//!
//! Prices are USD per 1,000 tokens for text models and USD per unit for
//! search and image services. The built-in table mirrors published vendor
//! rates; deployments override it with a JSON file so rate changes do not
//! need a rebuild.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

// ============================================================================
// Built-in rates (USD)
// ============================================================================

/// Claude 3 Haiku input cost per 1K tokens
pub const CLAUDE3_HAIKU_INPUT_COST: f64 = 0.00025;
/// Claude 3 Haiku output cost per 1K tokens
pub const CLAUDE3_HAIKU_OUTPUT_COST: f64 = 0.00125;
/// Claude 3 / 3.5 Sonnet input cost per 1K tokens
pub const CLAUDE3_SONNET_INPUT_COST: f64 = 0.003;
/// Claude 3 / 3.5 Sonnet output cost per 1K tokens
pub const CLAUDE3_SONNET_OUTPUT_COST: f64 = 0.015;
/// Claude 3 Opus input cost per 1K tokens
pub const CLAUDE3_OPUS_INPUT_COST: f64 = 0.015;
/// Claude 3 Opus output cost per 1K tokens
pub const CLAUDE3_OPUS_OUTPUT_COST: f64 = 0.075;

/// GPT-4 Turbo input cost per 1K tokens
pub const GPT4_TURBO_INPUT_COST: f64 = 0.01;
/// GPT-4 Turbo output cost per 1K tokens
pub const GPT4_TURBO_OUTPUT_COST: f64 = 0.03;
/// GPT-4o input cost per 1K tokens
pub const GPT4O_INPUT_COST: f64 = 0.005;
/// GPT-4o output cost per 1K tokens
pub const GPT4O_OUTPUT_COST: f64 = 0.015;
/// GPT-3.5 Turbo input cost per 1K tokens
pub const GPT35_TURBO_INPUT_COST: f64 = 0.0005;
/// GPT-3.5 Turbo output cost per 1K tokens
pub const GPT35_TURBO_OUTPUT_COST: f64 = 0.0015;

/// Perplexity online search, per request
pub const PERPLEXITY_SEARCH_COST: f64 = 0.005;
/// DALL-E 3 standard 1024x1024, per image
pub const DALLE3_IMAGE_COST: f64 = 0.04;
/// DALL-E 3 HD, per image
pub const DALLE3_HD_IMAGE_COST: f64 = 0.08;
/// Ideogram v2, per image
pub const IDEOGRAM_V2_IMAGE_COST: f64 = 0.08;
/// Ideogram v2 turbo, per image
pub const IDEOGRAM_TURBO_IMAGE_COST: f64 = 0.05;

// ============================================================================
// Schedules
// ============================================================================

/// Price schedule for one model of one service.
///
/// Serialized in the same shape operators write pricing files in:
/// `{"input": .., "output": ..}`, `{"perSearch": ..}` or `{"perImage": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceSchedule {
    /// Text generation, priced per 1,000 tokens
    Tokens {
        /// Input (prompt) price per 1K tokens
        input: f64,
        /// Output (completion) price per 1K tokens
        output: f64,
    },
    /// Flat price per search request
    Search {
        /// Price per search
        #[serde(rename = "perSearch")]
        per_search: f64,
    },
    /// Flat price per generated image
    Image {
        /// Price per image
        #[serde(rename = "perImage")]
        per_image: f64,
    },
}

impl PriceSchedule {
    /// Token schedule helper
    #[must_use]
    pub const fn tokens(input: f64, output: f64) -> Self {
        Self::Tokens { input, output }
    }

    /// Cost of a text generation call, or `None` if this is not a token schedule
    #[must_use]
    pub fn token_cost(&self, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        match self {
            Self::Tokens { input, output } => Some(
                (input_tokens as f64 / 1000.0) * input + (output_tokens as f64 / 1000.0) * output,
            ),
            _ => None,
        }
    }

    /// Cost of `count` searches, or `None` if this is not a search schedule
    #[must_use]
    pub fn search_cost(&self, count: u64) -> Option<f64> {
        match self {
            Self::Search { per_search } => Some(count as f64 * per_search),
            _ => None,
        }
    }

    /// Cost of `count` images, or `None` if this is not an image schedule
    #[must_use]
    pub fn image_cost(&self, count: u64) -> Option<f64> {
        match self {
            Self::Image { per_image } => Some(count as f64 * per_image),
            _ => None,
        }
    }
}

/// Service -> model -> price schedule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    services: BTreeMap<String, BTreeMap<String, PriceSchedule>>,
}

impl PricingTable {
    /// Empty table
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in vendor rates
    #[must_use]
    pub fn default_table() -> Self {
        Self::empty()
            .with_price(
                "anthropic",
                "claude-3-haiku",
                PriceSchedule::tokens(CLAUDE3_HAIKU_INPUT_COST, CLAUDE3_HAIKU_OUTPUT_COST),
            )
            .with_price(
                "anthropic",
                "claude-3-sonnet",
                PriceSchedule::tokens(CLAUDE3_SONNET_INPUT_COST, CLAUDE3_SONNET_OUTPUT_COST),
            )
            .with_price(
                "anthropic",
                "claude-3-5-sonnet",
                PriceSchedule::tokens(CLAUDE3_SONNET_INPUT_COST, CLAUDE3_SONNET_OUTPUT_COST),
            )
            .with_price(
                "anthropic",
                "claude-3-opus",
                PriceSchedule::tokens(CLAUDE3_OPUS_INPUT_COST, CLAUDE3_OPUS_OUTPUT_COST),
            )
            .with_price(
                "openai",
                "gpt-4-turbo",
                PriceSchedule::tokens(GPT4_TURBO_INPUT_COST, GPT4_TURBO_OUTPUT_COST),
            )
            .with_price(
                "openai",
                "gpt-4o",
                PriceSchedule::tokens(GPT4O_INPUT_COST, GPT4O_OUTPUT_COST),
            )
            .with_price(
                "openai",
                "gpt-3.5-turbo",
                PriceSchedule::tokens(GPT35_TURBO_INPUT_COST, GPT35_TURBO_OUTPUT_COST),
            )
            .with_price(
                "openai",
                "dall-e-3",
                PriceSchedule::Image {
                    per_image: DALLE3_IMAGE_COST,
                },
            )
            .with_price(
                "openai",
                "dall-e-3-hd",
                PriceSchedule::Image {
                    per_image: DALLE3_HD_IMAGE_COST,
                },
            )
            .with_price(
                "perplexity",
                "sonar",
                PriceSchedule::Search {
                    per_search: PERPLEXITY_SEARCH_COST,
                },
            )
            .with_price(
                "ideogram",
                "v2",
                PriceSchedule::Image {
                    per_image: IDEOGRAM_V2_IMAGE_COST,
                },
            )
            .with_price(
                "ideogram",
                "v2-turbo",
                PriceSchedule::Image {
                    per_image: IDEOGRAM_TURBO_IMAGE_COST,
                },
            )
    }

    /// Load a table from a JSON pricing file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let table: Self = serde_json::from_str(&content)?;
        if table.services.is_empty() {
            return Err(Error::InvalidInput(format!(
                "pricing file {:?} defines no services",
                path
            )));
        }
        info!(path = ?path, services = table.services.len(), "Loaded pricing table");
        Ok(table)
    }

    /// Set (or replace) the schedule for one model
    #[must_use]
    pub fn with_price(
        mut self,
        service: impl Into<String>,
        model: impl Into<String>,
        schedule: PriceSchedule,
    ) -> Self {
        self.set_price(service, model, schedule);
        self
    }

    /// Set (or replace) the schedule for one model in place
    pub fn set_price(
        &mut self,
        service: impl Into<String>,
        model: impl Into<String>,
        schedule: PriceSchedule,
    ) {
        self.services
            .entry(service.into())
            .or_default()
            .insert(model.into(), schedule);
    }

    /// Look up a schedule
    #[must_use]
    pub fn get(&self, service: &str, model: &str) -> Option<&PriceSchedule> {
        self.services.get(service)?.get(model)
    }

    /// Iterate `(service, model, schedule)` in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &PriceSchedule)> {
        self.services.iter().flat_map(|(service, models)| {
            models
                .iter()
                .map(move |(model, schedule)| (service.as_str(), model.as_str(), schedule))
        })
    }

    /// Number of priced models
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.values().map(BTreeMap::len).sum()
    }

    /// Whether no model is priced
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
