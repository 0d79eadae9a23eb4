//! Reporting over spend history: analytics, ROI and export

use crate::error::{Error, Result};
use crate::ledger::{day_key, CostLedger};
use crate::session::{CostCategory, Session};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reporting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsPeriod {
    /// Today (UTC)
    Day,
    /// The last seven days, today included
    Week,
    /// The current calendar month
    Month,
    /// Everything on record
    All,
}

impl AnalyticsPeriod {
    /// First instant covered by the period, or `None` for all time
    #[must_use]
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()?;
        match self {
            Self::Day => Some(today),
            Self::Week => Some(today - Duration::days(6)),
            Self::Month => Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                .single(),
            Self::All => None,
        }
    }
}

impl std::str::FromStr for AnalyticsPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "day" | "today" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "all" => Ok(Self::All),
            other => Err(Error::InvalidInput(format!("unknown period: {other}"))),
        }
    }
}

impl std::fmt::Display for AnalyticsPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Aggregated spend for a period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostAnalytics {
    /// Reporting window
    pub period: Option<AnalyticsPeriod>,
    /// Finished sessions started within the window
    pub session_count: usize,
    /// Spend of those sessions
    pub total_cost: f64,
    /// `total_cost / session_count`
    pub average_cost_per_book: f64,
    /// Spend by category
    pub by_category: BTreeMap<CostCategory, f64>,
    /// Spend by service
    pub by_service: BTreeMap<String, f64>,
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
    /// Search requests
    pub searches: u64,
    /// Generated images
    pub images: u64,
    /// Ledger spend per day within the window
    pub daily: BTreeMap<String, f64>,
}

/// Aggregate finished sessions in `period`
#[must_use]
pub fn analyze(ledger: &CostLedger, period: AnalyticsPeriod, now: DateTime<Utc>) -> CostAnalytics {
    let start = period.start(now);
    let in_window = |s: &&Session| start.is_none_or(|start| s.start_time >= start);

    let mut analytics = CostAnalytics {
        period: Some(period),
        ..Default::default()
    };

    for session in ledger.sessions.values().filter(in_window) {
        analytics.session_count += 1;
        analytics.total_cost += session.costs.total;
        analytics.input_tokens += session.usage.tokens.input;
        analytics.output_tokens += session.usage.tokens.output;
        analytics.searches += session.usage.searches;
        analytics.images += session.usage.images;

        for category in [CostCategory::Llm, CostCategory::Search, CostCategory::Images] {
            *analytics.by_category.entry(category).or_insert(0.0) +=
                session.costs.get(category);
        }
        for record in &session.breakdown {
            *analytics
                .by_service
                .entry(record.service.clone())
                .or_insert(0.0) += record.cost;
        }
    }

    if analytics.session_count > 0 {
        analytics.average_cost_per_book = analytics.total_cost / analytics.session_count as f64;
    }

    let first_day = start.map(day_key);
    analytics.daily = ledger
        .daily
        .iter()
        .filter(|(day, _)| first_day.as_ref().is_none_or(|first| *day >= first))
        .map(|(day, cost)| (day.clone(), *cost))
        .collect();

    analytics
}

/// Return on investment for a book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiReport {
    /// Sale price per unit
    pub book_price: f64,
    /// Units sold
    pub units_sold: u64,
    /// `book_price * units_sold`
    pub revenue: f64,
    /// Average generation cost per finished book
    pub cost_per_book: f64,
    /// `revenue - cost_per_book`
    pub profit: f64,
    /// `profit / cost_per_book * 100`, or `None` when nothing was spent
    pub roi_percent: Option<f64>,
    /// Units needed to cover generation cost, or `None` for a free book
    pub break_even_units: Option<u64>,
}

/// ROI of a book sold at `book_price`, costed at the historical average per book
pub fn calculate_roi(ledger: &CostLedger, book_price: f64, units_sold: u64) -> Result<RoiReport> {
    if !book_price.is_finite() || book_price < 0.0 {
        return Err(Error::InvalidInput(format!(
            "book price must be a non-negative number, got {book_price}"
        )));
    }

    let cost_per_book = if ledger.sessions.is_empty() {
        0.0
    } else {
        ledger.total / ledger.sessions.len() as f64
    };
    let revenue = book_price * units_sold as f64;
    let profit = revenue - cost_per_book;

    Ok(RoiReport {
        book_price,
        units_sold,
        revenue,
        cost_per_book,
        profit,
        roi_percent: (cost_per_book > 0.0).then(|| profit / cost_per_book * 100.0),
        break_even_units: (book_price > 0.0).then(|| (cost_per_book / book_price).ceil() as u64),
    })
}

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Full ledger as pretty JSON (reloadable with `CostLedger::from_json_export`)
    Json,
    /// One row per session
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(Error::InvalidInput(format!("unknown export format: {other}"))),
        }
    }
}

/// CSV header for session exports
pub const CSV_HEADER: &str = "id,start_time,end_time,llm,search,images,total";

/// Serialize the ledger
pub fn export(ledger: &CostLedger, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(ledger)?),
        ExportFormat::Csv => {
            let mut out = String::from(CSV_HEADER);
            out.push('\n');
            for session in ledger.sessions.values() {
                out.push_str(&format!(
                    "{},{},{},{:.6},{:.6},{:.6},{:.6}\n",
                    csv_field(&session.id),
                    session.start_time.to_rfc3339(),
                    session
                        .end_time
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default(),
                    session.costs.llm,
                    session.costs.search,
                    session.costs.images,
                    session.costs.total,
                ));
            }
            Ok(out)
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
