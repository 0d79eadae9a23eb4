//! Sessions and usage records
//!
//! A session spans one pipeline run (one book). Its totals are folded into
//! the daily/monthly ledgers when it ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spend category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostCategory {
    /// Text generation
    Llm,
    /// Web search
    Search,
    /// Image generation
    Images,
}

impl std::fmt::Display for CostCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Llm => write!(f, "llm"),
            Self::Search => write!(f, "search"),
            Self::Images => write!(f, "images"),
        }
    }
}

/// One priced call in a session's breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// When the call was tracked
    pub timestamp: DateTime<Utc>,
    /// Spend category
    pub category: CostCategory,
    /// Service name (e.g. "anthropic")
    pub service: String,
    /// Model name
    pub model: String,
    /// Input tokens (text generation only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    /// Output tokens (text generation only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    /// Units consumed (searches or images)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Cost in USD
    pub cost: f64,
}

/// Per-category cost totals (USD)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCosts {
    /// Text generation spend
    pub llm: f64,
    /// Search spend
    pub search: f64,
    /// Image generation spend
    pub images: f64,
    /// Sum of all categories
    pub total: f64,
}

impl SessionCosts {
    /// Add `cost` to `category` and to the total
    pub fn add(&mut self, category: CostCategory, cost: f64) {
        match category {
            CostCategory::Llm => self.llm += cost,
            CostCategory::Search => self.search += cost,
            CostCategory::Images => self.images += cost,
        }
        self.total += cost;
    }

    /// Cost attributed to `category`
    #[must_use]
    pub fn get(&self, category: CostCategory) -> f64 {
        match category {
            CostCategory::Llm => self.llm,
            CostCategory::Search => self.search,
            CostCategory::Images => self.images,
        }
    }
}

/// Token counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input: u64,
    /// Completion tokens
    pub output: u64,
}

/// Raw usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUsage {
    /// Token counters
    pub tokens: TokenUsage,
    /// Search requests
    pub searches: u64,
    /// Generated images
    pub images: u64,
}

/// A pipeline run's spend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier
    pub id: String,
    /// When the session started
    pub start_time: DateTime<Utc>,
    /// When the session ended, if it has
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Free-form metadata supplied by the pipeline (title, genre, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Cost totals
    pub costs: SessionCosts,
    /// Usage counters
    pub usage: SessionUsage,
    /// Every priced call, in tracking order
    #[serde(default)]
    pub breakdown: Vec<UsageRecord>,
}

impl Session {
    /// Create an empty session
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        start_time: DateTime<Utc>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            start_time,
            end_time: None,
            metadata,
            costs: SessionCosts::default(),
            usage: SessionUsage::default(),
            breakdown: Vec::new(),
        }
    }

    /// Append a record and update totals
    pub fn record(&mut self, record: UsageRecord) {
        self.costs.add(record.category, record.cost);
        match record.category {
            CostCategory::Llm => {
                self.usage.tokens.input += record.input_tokens.unwrap_or(0);
                self.usage.tokens.output += record.output_tokens.unwrap_or(0);
            }
            CostCategory::Search => self.usage.searches += record.count.unwrap_or(0),
            CostCategory::Images => self.usage.images += record.count.unwrap_or(0),
        }
        self.breakdown.push(record);
    }

    /// Session duration so far (or in total, once ended)
    #[must_use]
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.end_time.unwrap_or(now) - self.start_time
    }
}

/// Generate a fresh session identifier
#[must_use]
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
