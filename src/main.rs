//! Folio - governance CLI for ebook generation pipelines
//!
//! Inspects and manages the persisted cost ledger, budgets and pricing,
//! and runs the governance layer's background tasks.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod loader;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio=info,folio_core=info,folio_cost=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();
    debug!("Folio v{}", env!("CARGO_PKG_VERSION"));

    cli::run(cli).await
}
