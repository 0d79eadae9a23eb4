//! CLI module for Folio
//!
//! Provides operator commands over the persisted cost history:
//! - `spend`, `analytics`, `export`, `roi`, `pricing`: reporting
//! - `budget`: show or change spending ceilings
//! - `status`: configured limits, breakers and current spend
//! - `watch`: run the governance background tasks and log every event

use crate::loader::load_config;
use anyhow::Context;
use clap::{Parser, Subcommand};
use folio_cost::CostTracker;

pub mod budget;
pub mod report;
pub mod status;

/// Folio governance CLI
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Rate limits, circuit breakers and spend control for ebook pipelines")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show spend today, this month and all time
    Spend {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Aggregate finished books over a period
    Analytics {
        /// day, week, month or all
        #[arg(long, default_value = "month")]
        period: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export the cost ledger
    Export {
        /// json or csv
        #[arg(long, default_value = "json")]
        format: String,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<std::path::PathBuf>,
    },
    /// Show or change spending ceilings
    Budget {
        #[command(subcommand)]
        action: budget::BudgetAction,
    },
    /// Return on investment for a book price and sales volume
    Roi {
        /// Sale price per unit (USD)
        #[arg(long)]
        price: f64,
        /// Units sold
        #[arg(long)]
        units: u64,
    },
    /// List the active pricing table
    Pricing {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show configured limits, breakers and spend
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run maintenance and alert delivery, logging events until Ctrl+C
    Watch,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config()?;
    match command {
        Commands::Spend { json } => report::spend(&open_tracker(&config).await?, json),
        Commands::Analytics { period, json } => {
            report::analytics(&open_tracker(&config).await?, &period, json)
        }
        Commands::Export { format, output } => {
            report::export(&open_tracker(&config).await?, &format, output.as_deref()).await
        }
        Commands::Budget { action } => budget::run(&open_tracker(&config).await?, action).await,
        Commands::Roi { price, units } => report::roi(&open_tracker(&config).await?, price, units),
        Commands::Pricing { json } => report::pricing(&open_tracker(&config).await?, json),
        Commands::Status { json } => status::status(&config, open_tracker(&config).await?, json),
        Commands::Watch => status::watch(&config, open_tracker(&config).await?).await,
    }
}

async fn open_tracker(config: &crate::config::AppConfig) -> anyhow::Result<CostTracker> {
    CostTracker::from_config(&config.costs)
        .await
        .context("Failed to open cost ledger")
}
