//! CLI commands: `folio status` and `folio watch`

use crate::config::AppConfig;
use anyhow::{Context, Result};
use folio_core::{GovernanceEvent, GovernanceStatus, Governor, SystemClock, Window};
use folio_cost::CostTracker;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn governor(config: &AppConfig, tracker: CostTracker) -> Result<Governor> {
    Governor::from_config(&config.governance, Arc::new(tracker), Arc::new(SystemClock))
        .context("Invalid governance configuration")
}

/// Print configured limits, breakers and spend
pub fn status(config: &AppConfig, tracker: CostTracker, json: bool) -> Result<()> {
    let governor = governor(config, tracker)?;
    // Touch every configured breaker so the snapshot lists them
    for service in config.governance.rate_limits.keys() {
        governor.breakers().get_or_create(service);
    }
    let status = governor.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

fn print_status(status: &GovernanceStatus) {
    println!();
    println!("  Rate Limits");
    println!("  {}", "-".repeat(72));
    println!(
        "  {:<12} {:<9} {:<16} {:<16} {:<16}",
        "Service", "Kind", "Minute", "Hour", "Day"
    );
    println!("  {}", "-".repeat(72));
    for service in &status.services {
        let kinds = [
            ("requests", &service.usage.requests, &service.limits.requests),
            ("tokens", &service.usage.tokens, &service.limits.tokens),
        ];
        for (kind, usage, limits) in kinds {
            if limits.is_empty() {
                continue;
            }
            let cell = |w: Window| match limits.get(w) {
                Some(limit) => format!("{}/{}", usage.get(w), limit),
                None => "-".to_string(),
            };
            println!(
                "  {:<12} {:<9} {:<16} {:<16} {:<16}",
                service.service,
                kind,
                cell(Window::Minute),
                cell(Window::Hour),
                cell(Window::Day)
            );
        }
        if service.throttle.paused {
            println!("  {:<12} ⏸ paused", "");
        } else if service.throttle.throttled {
            println!("  {:<12} 🐢 throttled ({}ms)", "", service.throttle.delay_ms);
        }
    }

    println!();
    println!("  Circuit Breakers");
    println!("  {}", "-".repeat(72));
    for circuit in &status.circuits {
        let detail = circuit.last_error.as_deref().unwrap_or("");
        println!("  {:<12} {:<10} {}", circuit.name, circuit.state.to_string(), detail);
    }

    let spending = &status.spending;
    println!();
    println!(
        "  Spend: today ${:.4} | month ${:.4} | all time ${:.4}",
        spending.today, spending.month, spending.total
    );
    println!();
}

/// Run the governance background tasks and log every event until Ctrl+C
pub async fn watch(config: &AppConfig, tracker: CostTracker) -> Result<()> {
    let governor = governor(config, tracker)?;
    let shutdown = CancellationToken::new();
    let mut events = governor.events().subscribe();
    let handles = governor.spawn_background(&shutdown);

    info!(
        services = config.governance.rate_limits.len(),
        webhook = config.governance.alerts.webhook_url.is_some(),
        "Watching governance events (Ctrl+C to exit)"
    );

    let outcome = log_events(&mut events, tokio::signal::ctrl_c()).await;

    shutdown.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    outcome.map(|logged| info!(events = logged, "Watch stopped"))
}

/// Log events until `stop` resolves or the bus closes, returning how many were logged
async fn log_events<S>(events: &mut broadcast::Receiver<GovernanceEvent>, stop: S) -> Result<usize>
where
    S: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(stop);
    let mut logged = 0;
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    let payload = serde_json::to_string(&event)?;
                    info!(kind = event.kind(), subject = event.subject(), %payload, "Governance event");
                    logged += 1;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped = skipped, "Event log lagged"),
                Err(RecvError::Closed) => break,
            },
            signal = &mut stop => {
                signal.context("Failed to listen for Ctrl+C")?;
                info!("Shutting down");
                break;
            }
        }
    }
    Ok(logged)
}
