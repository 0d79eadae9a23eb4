//! CLI commands: `folio spend | analytics | export | roi | pricing`

use anyhow::{Context, Result};
use folio_cost::{AnalyticsPeriod, CostTracker, ExportFormat, PriceSchedule};
use std::path::Path;

/// Spend today, this month and all time
pub fn spend(tracker: &CostTracker, json: bool) -> Result<()> {
    let summary = tracker.get_current_spending();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!("  Spending ({})", summary.as_of.format("%Y-%m-%d %H:%M UTC"));
    println!("  {}", "-".repeat(48));
    println!(
        "  {:<12} {:>12} {:>10} {:>10}",
        "Scope", "Spent", "Ceiling", "Left"
    );
    println!("  {}", "-".repeat(48));
    print_row("Today", summary.today, summary.budgets.daily, summary.remaining.daily);
    print_row(
        "Month",
        summary.month,
        summary.budgets.monthly,
        summary.remaining.monthly,
    );
    if let Some(session) = summary.session {
        print_row(
            "This book",
            session,
            summary.budgets.per_book,
            summary.remaining.per_book,
        );
    }
    println!("  {:<12} {:>12}", "All time", money(summary.total));
    println!();
    Ok(())
}

fn print_row(label: &str, spent: f64, ceiling: Option<f64>, left: Option<f64>) {
    println!(
        "  {:<12} {:>12} {:>10} {:>10}",
        label,
        money(spent),
        ceiling.map_or_else(|| "-".to_string(), money),
        left.map_or_else(|| "-".to_string(), money),
    );
}

fn money(amount: f64) -> String {
    format!("${amount:.4}")
}

/// Aggregated spend over a period
pub fn analytics(tracker: &CostTracker, period: &str, json: bool) -> Result<()> {
    let period: AnalyticsPeriod = period.parse()?;
    let analytics = tracker.get_analytics(period);
    if json {
        println!("{}", serde_json::to_string_pretty(&analytics)?);
        return Ok(());
    }

    println!();
    println!("  Cost Analytics ({period})");
    println!("  {}", "-".repeat(48));
    println!("  Books:             {}", analytics.session_count);
    println!("  Total:             {}", money(analytics.total_cost));
    println!("  Average per book:  {}", money(analytics.average_cost_per_book));
    println!(
        "  Tokens:            {} in / {} out",
        analytics.input_tokens, analytics.output_tokens
    );
    println!("  Searches:          {}", analytics.searches);
    println!("  Images:            {}", analytics.images);

    if !analytics.by_category.is_empty() {
        println!();
        println!("  By category");
        for (category, cost) in &analytics.by_category {
            println!("    {:<16} {}", category.to_string(), money(*cost));
        }
    }
    if !analytics.by_service.is_empty() {
        println!();
        println!("  By service");
        for (service, cost) in &analytics.by_service {
            println!("    {:<16} {}", service, money(*cost));
        }
    }
    if !analytics.daily.is_empty() {
        println!();
        println!("  Daily");
        for (day, cost) in &analytics.daily {
            println!("    {:<16} {}", day, money(*cost));
        }
    }
    println!();
    Ok(())
}

/// Export the ledger to stdout or a file
pub async fn export(tracker: &CostTracker, format: &str, output: Option<&Path>) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let data = tracker.export_cost_data(format)?;

    match output {
        Some(path) => {
            tokio::fs::write(path, data)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported cost data to {}", path.display());
        }
        None => println!("{data}"),
    }
    Ok(())
}

/// ROI for a price and sales volume
pub fn roi(tracker: &CostTracker, price: f64, units: u64) -> Result<()> {
    let report = tracker.calculate_roi(price, units)?;

    println!();
    println!("  ROI at {} x {} units", money(report.book_price), report.units_sold);
    println!("  {}", "-".repeat(40));
    println!("  Revenue:        {}", money(report.revenue));
    println!("  Cost per book:  {}", money(report.cost_per_book));
    println!("  Profit:         {}", money(report.profit));
    match report.roi_percent {
        Some(pct) => println!("  ROI:            {pct:.1}%"),
        None => println!("  ROI:            - (no recorded cost)"),
    }
    match report.break_even_units {
        Some(units) => println!("  Break-even:     {units} units"),
        None => println!("  Break-even:     - (free book)"),
    }
    println!();
    Ok(())
}

/// Active pricing table
pub fn pricing(tracker: &CostTracker, json: bool) -> Result<()> {
    let table = tracker.pricing();
    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    println!();
    println!("  {:<12} {:<20} Price (USD)", "Service", "Model");
    println!("  {}", "-".repeat(60));
    for (service, model, schedule) in table.iter() {
        let price = match schedule {
            PriceSchedule::Tokens { input, output } => {
                format!("{input} in / {output} out per 1K tokens")
            }
            PriceSchedule::Search { per_search } => format!("{per_search} per search"),
            PriceSchedule::Image { per_image } => format!("{per_image} per image"),
        };
        println!("  {service:<12} {model:<20} {price}");
    }
    println!();
    Ok(())
}
