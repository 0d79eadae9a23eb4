//! Integration tests for Folio
//!
//! These tests drive the governance layer the way pipeline workers do:
//! - folio-core: governor admission, circuit breakers, events
//! - folio-cost: sessions, budgets, persisted ledgers and export

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use folio_core::{
    CircuitState, Error, GovernanceConfig, GovernanceEvent, Governor, ManualClock, Metered,
};
use folio_cost::{
    Budgets, CostLedger, CostTracker, ExportFormat, JsonFileStore, LedgerStore, PricingTable,
};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
    ))
}

async fn tracker(store: Arc<dyn LedgerStore>, clock: Arc<ManualClock>) -> Arc<CostTracker> {
    Arc::new(
        CostTracker::open(store, PricingTable::default_table(), 0.8, clock)
            .await
            .unwrap(),
    )
}

// ============================================================================
// Pipeline Scenarios
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_share_one_governor() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let store: Arc<dyn LedgerStore> = Arc::new(JsonFileStore::with_path(dir.path()));
    let costs = tracker(store.clone(), clock.clone()).await;
    costs
        .start_session(Some("book-1".to_string()), BTreeMap::new())
        .unwrap();

    let governor =
        Governor::from_config(&GovernanceConfig::default(), costs.clone(), clock.clone()).unwrap();

    // Writer workers
    let writers = (0..4).map(|i| {
        let governor = governor.clone();
        tokio::spawn(async move {
            governor
                .call("anthropic", || async move {
                    Ok::<_, String>(Metered::llm(format!("chapter {i}"), "claude-3-haiku", 4000, 1000))
                })
                .await
        })
    });
    let writer_results = futures::future::join_all(writers).await;
    for result in writer_results {
        assert!(result.unwrap().unwrap().starts_with("chapter"));
    }

    // Illustrator and researcher
    governor
        .call("ideogram", || async { Ok::<_, String>(Metered::image((), "v2", 1)) })
        .await
        .unwrap();
    governor
        .call("perplexity", || async {
            Ok::<_, String>(Metered::search((), "sonar", 2))
        })
        .await
        .unwrap();

    let session = costs.current_session().unwrap();
    assert!((session.costs.llm - 0.009).abs() < 1e-9);
    assert!((session.costs.images - 0.08).abs() < 1e-9);
    assert!((session.costs.search - 0.01).abs() < 1e-9);
    assert_eq!(session.breakdown.len(), 6);

    let anthropic = governor.limiter().get_status("anthropic").unwrap();
    assert_eq!(anthropic.usage.requests.minute, 4);
    assert_eq!(anthropic.usage.tokens.minute, 20_000);

    let report = costs.end_session().await.unwrap();
    assert!(report.contains("book-1"));

    // A second process sees the same history
    let reopened = tracker(store, clock.clone()).await;
    let ledger = reopened.ledger();
    assert_eq!(ledger.sessions.len(), 1);
    assert!((ledger.total - session.costs.total).abs() < 1e-9);
    assert!((ledger.daily["2026-03-14"] - session.costs.total).abs() < 1e-9);
    assert!((ledger.monthly["2026-03"] - session.costs.total).abs() < 1e-9);
}

#[tokio::test]
async fn test_export_round_trip_reproduces_ledgers() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let costs = tracker(Arc::new(JsonFileStore::with_path(dir.path())), clock.clone()).await;

    for day in 0..3 {
        costs.start_session(None, BTreeMap::new()).unwrap();
        costs
            .track_llm_usage("anthropic", "claude-3-5-sonnet", 12_000 + day * 500, 3_000)
            .unwrap();
        costs.track_image_usage("openai", "dall-e-3", 2).unwrap();
        costs.end_session().await.unwrap();
        clock.advance(std::time::Duration::from_secs(86_400));
    }

    let exported = costs.export_cost_data(ExportFormat::Json).unwrap();
    let reloaded = CostLedger::from_json_export(&exported).unwrap();
    let original = costs.ledger();

    assert_eq!(reloaded.sessions.len(), 3);
    assert_eq!(reloaded.daily.len(), 3);
    for (day, spent) in &original.daily {
        assert!((reloaded.daily[day] - spent).abs() < 1e-9);
    }
    for (month, spent) in &original.monthly {
        assert!((reloaded.monthly[month] - spent).abs() < 1e-9);
    }
    assert!((reloaded.total - original.total).abs() < 1e-9);

    let csv = costs.export_cost_data(ExportFormat::Csv).unwrap();
    assert_eq!(csv.lines().count(), 4);
}

#[tokio::test]
async fn test_per_book_budget_stops_the_book() {
    let clock = clock();
    let store: Arc<dyn LedgerStore> = Arc::new(folio_cost::MemoryLedgerStore::new());
    let costs = tracker(store, clock.clone()).await;
    costs
        .set_budgets(Budgets::default().with_per_book(0.2).with_daily(0.1))
        .await
        .unwrap();
    costs.start_session(None, BTreeMap::new()).unwrap();
    let governor =
        Governor::from_config(&GovernanceConfig::default(), costs.clone(), clock).unwrap();

    let mut completed = 0;
    let mut stopped = None;
    for _ in 0..5 {
        match governor
            .call("ideogram", || async { Ok::<_, String>(Metered::image((), "v2", 1)) })
            .await
        {
            Ok(()) => completed += 1,
            Err(e) => {
                stopped = Some(e);
                break;
            }
        }
    }

    // Daily overrun after the second image only warned
    assert_eq!(completed, 2);
    let err = stopped.unwrap();
    assert!(err.is_budget_exceeded());
    assert!(folio_core::format_error_for_cli(&err).contains("per-book"));
}

#[tokio::test]
async fn test_failing_dependency_is_isolated() {
    let clock = clock();
    let costs = tracker(Arc::new(folio_cost::MemoryLedgerStore::new()), clock.clone()).await;
    costs.start_session(None, BTreeMap::new()).unwrap();
    let governor =
        Governor::from_config(&GovernanceConfig::default(), costs, clock.clone()).unwrap();
    let mut dashboard = governor.events().subscribe();
    let mut logger = governor.events().subscribe();

    for _ in 0..5 {
        let err = governor
            .call("openai", || async { Err::<Metered<()>, _>("HTTP 503") })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
    }

    // openai is open; anthropic is untouched
    let err = governor
        .call("openai", || async { Ok::<_, String>(Metered::unmetered(())) })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CircuitOpen { .. }));
    governor
        .call("anthropic", || async { Ok::<_, String>(Metered::unmetered(())) })
        .await
        .unwrap();

    // Fallback answers while open
    let breaker = governor.breakers().get_or_create("openai");
    let cover = breaker
        .fire_with_fallback(
            || async { Ok::<_, String>("generated") },
            |_| "stock-cover.png",
        )
        .await;
    assert_eq!(cover, "stock-cover.png");

    // Recovery after the cooldown
    clock.advance(std::time::Duration::from_secs(60));
    for _ in 0..3 {
        tokio_test::assert_ok!(
            governor
                .call("openai", || async { Ok::<_, String>(Metered::unmetered(())) })
                .await
        );
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    for rx in [&mut dashboard, &mut logger] {
        let mut transitions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let GovernanceEvent::CircuitStateChanged { to, .. } = event {
                transitions.push(to);
            }
        }
        assert_eq!(
            transitions,
            vec![CircuitState::Open, CircuitState::HalfOpen, CircuitState::Closed]
        );
    }
}
