use super::*;
use crate::budget::BudgetScope;
use crate::clock::ManualClock;
use crate::store::{JsonFileStore, MemoryLedgerStore};
use chrono::{TimeZone, Utc};
use std::time::Duration;

fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
}

async fn tracker_with(store: Arc<dyn LedgerStore>, clock: Arc<ManualClock>) -> CostTracker {
    let pricing = PricingTable::default_table()
        .with_price("test", "flat", PriceSchedule::tokens(0.003, 0.015))
        .with_price("test", "cover", PriceSchedule::Image { per_image: 0.5 });
    CostTracker::open(store, pricing, 0.8, clock).await.unwrap()
}

async fn tracker() -> (CostTracker, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start_time()));
    let tracker = tracker_with(Arc::new(MemoryLedgerStore::new()), clock.clone()).await;
    (tracker, clock)
}

#[tokio::test]
async fn test_llm_cost_per_thousand_tokens() {
    let (tracker, _) = tracker().await;
    tracker.start_session(None, BTreeMap::new()).unwrap();

    let cost = tracker.track_llm_usage("test", "flat", 1000, 1000).unwrap();
    assert_eq!(cost, Some(0.018));
}

#[tokio::test]
async fn test_claude_haiku_pricing() {
    let (tracker, _) = tracker().await;
    tracker.start_session(None, BTreeMap::new()).unwrap();

    let cost = tracker
        .track_llm_usage("anthropic", "claude-3-haiku", 4000, 1000)
        .unwrap()
        .unwrap();
    assert!((cost - 0.00225).abs() < 1e-12);

    let session = tracker.current_session().unwrap();
    assert_eq!(session.usage.tokens.input, 4000);
    assert_eq!(session.usage.tokens.output, 1000);
    assert_eq!(session.breakdown.len(), 1);
    assert!((session.costs.llm - 0.00225).abs() < 1e-12);
}

#[tokio::test]
async fn test_unknown_pricing_is_skipped() {
    let (tracker, _) = tracker().await;
    tracker.start_session(None, BTreeMap::new()).unwrap();

    assert_eq!(
        tracker.track_llm_usage("anthropic", "claude-9", 100, 100).unwrap(),
        None
    );
    // a search price is not an image price
    assert_eq!(
        tracker.track_image_usage("perplexity", "sonar", 1).unwrap(),
        None
    );

    let session = tracker.current_session().unwrap();
    assert!(session.breakdown.is_empty());
    assert_eq!(session.costs.total, 0.0);
}

#[tokio::test]
async fn test_search_and_image_usage() {
    let (tracker, _) = tracker().await;
    tracker.start_session(None, BTreeMap::new()).unwrap();

    tracker.track_search_usage("perplexity", "sonar", 4).unwrap();
    tracker.track_image_usage("ideogram", "v2", 2).unwrap();

    let session = tracker.current_session().unwrap();
    assert_eq!(session.usage.searches, 4);
    assert_eq!(session.usage.images, 2);
    assert!((session.costs.search - 0.02).abs() < 1e-12);
    assert!((session.costs.images - 0.16).abs() < 1e-12);
    assert!((session.costs.total - 0.18).abs() < 1e-12);
}

#[tokio::test]
async fn test_tracking_without_session_fails() {
    let (tracker, _) = tracker().await;
    let err = tracker.track_llm_usage("test", "flat", 10, 10).unwrap_err();
    assert!(matches!(err, Error::NoActiveSession));
}

#[tokio::test]
async fn test_one_session_at_a_time() {
    let (tracker, _) = tracker().await;
    tracker
        .start_session(Some("book-1".to_string()), BTreeMap::new())
        .unwrap();

    let err = tracker.start_session(None, BTreeMap::new()).unwrap_err();
    assert!(matches!(err, Error::SessionAlreadyActive(id) if id == "book-1"));
}

#[tokio::test]
async fn test_per_book_limit_is_strict() {
    let (tracker, _) = tracker().await;
    tracker
        .set_budgets(Budgets::default().with_per_book(2.0))
        .await
        .unwrap();
    tracker.start_session(None, BTreeMap::new()).unwrap();

    // 4 x $0.50 lands exactly on the ceiling
    for _ in 0..4 {
        tracker.track_image_usage("test", "cover", 1).unwrap();
    }
    assert!(tracker.check_budget().is_ok());

    let err = tracker.track_image_usage("test", "cover", 1).unwrap_err();
    assert!(err.is_budget_exceeded());
    assert!(matches!(err, Error::BudgetExceeded { limit, .. } if limit == 2.0));

    // the overrunning call is still on the books
    assert_eq!(tracker.current_session().unwrap().costs.total, 2.5);
    tokio_test::assert_err!(tracker.check_budget());
}

#[tokio::test]
async fn test_daily_and_monthly_overruns_only_warn() {
    let (tracker, _) = tracker().await;
    tracker
        .set_budgets(Budgets::default().with_daily(0.5).with_monthly(0.5))
        .await
        .unwrap();
    tracker.start_session(None, BTreeMap::new()).unwrap();

    tracker.track_image_usage("test", "cover", 3).unwrap();

    let status = tracker.check_budget().unwrap();
    assert_eq!(status.checks.len(), 2);
    assert_eq!(status.warnings.len(), 2);
    assert!(status.check(BudgetScope::Daily).unwrap().is_exceeded());
    assert!(status.check(BudgetScope::PerBook).is_none());
}

#[tokio::test]
async fn test_alert_threshold_warning() {
    let (tracker, _) = tracker().await;
    tracker
        .set_budgets(Budgets::default().with_per_book(1.0))
        .await
        .unwrap();
    tracker.start_session(None, BTreeMap::new()).unwrap();

    tracker.track_image_usage("test", "cover", 1).unwrap();
    assert!(tracker.check_budget().unwrap().warnings.is_empty());

    tracker.track_search_usage("perplexity", "sonar", 60).unwrap();
    let status = tracker.check_budget().unwrap();
    assert_eq!(status.warnings.len(), 1);
    assert!(status.warnings[0].contains("per-book"));
}

#[tokio::test]
async fn test_negative_budget_rejected() {
    let (tracker, _) = tracker().await;
    let err = tracker
        .set_budgets(Budgets::default().with_daily(-1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_end_session_folds_into_ledgers() {
    let store = Arc::new(MemoryLedgerStore::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let tracker = tracker_with(store.clone(), clock.clone()).await;

    tracker
        .start_session(Some("book-1".to_string()), BTreeMap::new())
        .unwrap();
    tracker.track_image_usage("test", "cover", 2).unwrap();
    clock.advance(Duration::from_secs(90));

    let report = tracker.end_session().await.unwrap();
    assert!(report.contains("book-1"));
    assert!(report.contains("Total: $1.0000"));
    assert!(tracker.current_session().is_none());

    let persisted = store.load_ledger().await.unwrap();
    assert_eq!(persisted.total, 1.0);
    assert_eq!(persisted.daily.get("2026-03-14"), Some(&1.0));
    assert_eq!(persisted.monthly.get("2026-03"), Some(&1.0));
    let session = persisted.sessions.get("book-1").unwrap();
    assert_eq!(session.end_time, Some(start_time() + chrono::Duration::seconds(90)));

    assert!(matches!(
        tracker.end_session().await.unwrap_err(),
        Error::NoActiveSession
    ));
}

#[tokio::test]
async fn test_current_spending_includes_running_session() {
    let (tracker, _) = tracker().await;
    tracker
        .set_budgets(Budgets::default().with_daily(10.0).with_per_book(2.0))
        .await
        .unwrap();

    tracker.start_session(None, BTreeMap::new()).unwrap();
    tracker.track_image_usage("test", "cover", 2).unwrap();
    tracker.end_session().await.unwrap();

    tracker.start_session(None, BTreeMap::new()).unwrap();
    tracker.track_image_usage("test", "cover", 1).unwrap();

    let spending = tracker.get_current_spending();
    assert_eq!(spending.today, 1.5);
    assert_eq!(spending.month, 1.5);
    assert_eq!(spending.total, 1.5);
    assert_eq!(spending.session, Some(0.5));
    assert_eq!(spending.remaining.daily, Some(8.5));
    assert_eq!(spending.remaining.per_book, Some(1.5));
    assert_eq!(spending.remaining.monthly, None);
}

#[tokio::test]
async fn test_analytics_by_period() {
    let (tracker, clock) = tracker().await;

    tracker.start_session(None, BTreeMap::new()).unwrap();
    tracker.track_llm_usage("test", "flat", 1000, 1000).unwrap();
    tracker.track_search_usage("perplexity", "sonar", 2).unwrap();
    tracker.end_session().await.unwrap();

    clock.advance(Duration::from_secs(3 * 24 * 3600));

    tracker.start_session(None, BTreeMap::new()).unwrap();
    tracker.track_image_usage("test", "cover", 1).unwrap();
    tracker.end_session().await.unwrap();

    let today = tracker.get_analytics(AnalyticsPeriod::Day);
    assert_eq!(today.session_count, 1);
    assert_eq!(today.total_cost, 0.5);
    assert_eq!(today.daily.len(), 1);

    let week = tracker.get_analytics(AnalyticsPeriod::Week);
    assert_eq!(week.session_count, 2);
    assert_eq!(week.input_tokens, 1000);
    assert_eq!(week.searches, 2);
    assert_eq!(week.images, 1);
    assert_eq!(week.by_service.len(), 2);
    assert!((week.by_category[&CostCategory::Llm] - 0.018).abs() < 1e-12);
    assert!((week.average_cost_per_book - (0.528 / 2.0)).abs() < 1e-12);
}

#[tokio::test]
async fn test_roi() {
    let (tracker, _) = tracker().await;

    for _ in 0..2 {
        tracker.start_session(None, BTreeMap::new()).unwrap();
        tracker.track_image_usage("test", "cover", 4).unwrap();
        tracker.end_session().await.unwrap();
    }

    let roi = tracker.calculate_roi(4.99, 10).unwrap();
    assert_eq!(roi.cost_per_book, 2.0);
    assert!((roi.revenue - 49.9).abs() < 1e-9);
    assert!((roi.profit - 47.9).abs() < 1e-9);
    assert!((roi.roi_percent.unwrap() - 2395.0).abs() < 1e-6);
    assert_eq!(roi.break_even_units, Some(1));

    tokio_test::assert_err!(tracker.calculate_roi(-1.0, 1));
    assert_eq!(tracker.calculate_roi(0.0, 5).unwrap().break_even_units, None);
}

#[tokio::test]
async fn test_json_export_round_trip() {
    let (tracker, clock) = tracker().await;

    tracker.start_session(None, BTreeMap::new()).unwrap();
    tracker
        .track_llm_usage("anthropic", "claude-3-haiku", 4000, 1000)
        .unwrap();
    tracker.end_session().await.unwrap();

    clock.advance(Duration::from_secs(40 * 24 * 3600));
    tracker.start_session(None, BTreeMap::new()).unwrap();
    tracker.track_image_usage("ideogram", "v2", 3).unwrap();
    tracker.end_session().await.unwrap();

    let exported = tracker.export_cost_data(ExportFormat::Json).unwrap();
    let reloaded = CostLedger::from_json_export(&exported).unwrap();
    let original = tracker.ledger();

    assert_eq!(reloaded.daily, original.daily);
    assert_eq!(reloaded.monthly, original.monthly);
    assert_eq!(reloaded.total, original.total);
    assert_eq!(reloaded.monthly.len(), 2);
}

#[tokio::test]
async fn test_csv_export() {
    let (tracker, _) = tracker().await;
    tracker
        .start_session(Some("book,1".to_string()), BTreeMap::new())
        .unwrap();
    tracker.track_image_usage("test", "cover", 1).unwrap();
    tracker.end_session().await.unwrap();

    let csv = tracker.export_cost_data(ExportFormat::Csv).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines[0], crate::analytics::CSV_HEADER);
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("\"book,1\","));
    assert!(lines[1].ends_with(",0.000000,0.000000,0.500000,0.500000"));
}

#[tokio::test]
async fn test_file_store_persists_across_trackers() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));

    {
        let tracker = tracker_with(Arc::new(JsonFileStore::with_path(dir.path())), clock.clone()).await;
        tracker
            .set_budgets(Budgets::default().with_monthly(100.0))
            .await
            .unwrap();
        tracker.start_session(None, BTreeMap::new()).unwrap();
        tracker.track_image_usage("test", "cover", 3).unwrap();
        tracker.end_session().await.unwrap();
    }

    let raw = std::fs::read_to_string(dir.path().join("costs.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["total"], 1.5);
    assert!(json["sessions"].is_object());

    let budgets = std::fs::read_to_string(dir.path().join("budgets.json")).unwrap();
    assert!(budgets.contains("\"perBook\": null"));

    let reopened = tracker_with(Arc::new(JsonFileStore::with_path(dir.path())), clock).await;
    assert_eq!(reopened.ledger().total, 1.5);
    assert_eq!(reopened.budgets().monthly, Some(100.0));
}

#[test]
fn test_pricing_file_format() {
    let json = r#"{
        "anthropic": {"claude-3-haiku": {"input": 0.00025, "output": 0.00125}},
        "perplexity": {"sonar": {"perSearch": 0.005}},
        "ideogram": {"v2": {"perImage": 0.08}}
    }"#;
    let table: PricingTable = serde_json::from_str(json).unwrap();

    assert_eq!(table.len(), 3);
    assert_eq!(
        table.get("anthropic", "claude-3-haiku"),
        Some(&PriceSchedule::tokens(0.00025, 0.00125))
    );
    assert_eq!(
        table.get("perplexity", "sonar"),
        Some(&PriceSchedule::Search { per_search: 0.005 })
    );
    assert_eq!(
        table.get("ideogram", "v2").and_then(|s| s.image_cost(2)),
        Some(0.16)
    );
}

#[test]
fn test_pricing_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pricing.json");
    std::fs::write(&path, r#"{"replicate": {"sdxl": {"perImage": 0.01}}}"#).unwrap();

    let table = PricingTable::from_json_file(&path).unwrap();
    assert_eq!(table.len(), 1);

    std::fs::write(&path, "{}").unwrap();
    tokio_test::assert_err!(PricingTable::from_json_file(&path));
}

/// Holds the first ledger save until released
#[derive(Default)]
struct GatedStore {
    inner: MemoryLedgerStore,
    first_started: tokio::sync::Notify,
    release_first: tokio::sync::Notify,
    saves: std::sync::atomic::AtomicUsize,
}

#[async_trait::async_trait]
impl LedgerStore for GatedStore {
    async fn load_ledger(&self) -> Result<CostLedger> {
        self.inner.load_ledger().await
    }

    async fn save_ledger(&self, ledger: &CostLedger) -> Result<()> {
        let n = self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if n == 0 {
            self.first_started.notify_one();
            self.release_first.notified().await;
        }
        self.inner.save_ledger(ledger).await
    }

    async fn load_budgets(&self) -> Result<Budgets> {
        self.inner.load_budgets().await
    }

    async fn save_budgets(&self, budgets: &Budgets) -> Result<()> {
        self.inner.save_budgets(budgets).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_save_is_not_overwritten_by_older_snapshot() {
    let store = Arc::new(GatedStore::default());
    let clock = Arc::new(ManualClock::new(start_time()));
    let tracker = Arc::new(tracker_with(store.clone(), clock).await);

    tracker.start_session(Some("a".to_string()), BTreeMap::new()).unwrap();
    tracker.track_llm_usage("test", "flat", 1000, 0).unwrap();
    let first = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.end_session().await }
    });
    store.first_started.notified().await;

    tracker.start_session(Some("b".to_string()), BTreeMap::new()).unwrap();
    tracker.track_llm_usage("test", "flat", 2000, 0).unwrap();
    let second = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.end_session().await }
    });

    store.release_first.notify_one();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let persisted = store.load_ledger().await.unwrap();
    assert_eq!(persisted.sessions.len(), 2);
    assert_eq!(persisted, tracker.ledger());
}
