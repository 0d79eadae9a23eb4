use super::*;
use crate::config::WindowLimits;
use chrono::TimeZone;
use folio_cost::ManualClock;
use tokio::sync::broadcast;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 15).unwrap()
}

fn limiter_with(limits: HashMap<String, ServiceLimits>) -> (RateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let limiter = RateLimiter::new(limits).with_clock(clock.clone());
    (limiter, clock)
}

fn per_minute(service: &str, limit: u64) -> HashMap<String, ServiceLimits> {
    HashMap::from([(
        service.to_string(),
        ServiceLimits::requests(WindowLimits::per_minute(limit)),
    )])
}

fn drain(rx: &mut broadcast::Receiver<GovernanceEvent>) -> Vec<GovernanceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn alert_thresholds(events: &[GovernanceEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            GovernanceEvent::QuotaAlert { threshold, .. } => Some(*threshold),
            _ => None,
        })
        .collect()
}

#[test]
fn test_minute_limit_denies_sixth_request() {
    let (limiter, _clock) = limiter_with(crate::config::default_rate_limits());

    for _ in 0..5 {
        limiter.record_usage("ideogram", UsageKind::Request, 1);
    }
    let decision = limiter.check_limit("ideogram", UsageKind::Request, 1);

    assert!(!decision.allowed);
    assert!(decision.reason.as_deref().unwrap().contains("minute limit exceeded"));
    assert_eq!(decision.current, Some(5));
    assert_eq!(decision.limit, Some(5));
    assert_eq!(decision.window, Some(Window::Minute));
    // 09:30:15 -> next full minute
    assert_eq!(decision.reset_in(), Some(Duration::from_secs(45)));
}

#[test]
fn test_check_limit_records_nothing() {
    let (limiter, _clock) = limiter_with(per_minute("svc", 3));

    for _ in 0..10 {
        assert!(limiter.check_limit("svc", UsageKind::Request, 1).allowed);
    }
    let status = limiter.get_status("svc").unwrap();
    assert_eq!(status.usage.requests.minute, 0);
}

#[test]
fn test_unknown_service_is_allowed() {
    let (limiter, _clock) = limiter_with(per_minute("svc", 1));

    let decision = limiter.acquire("mystery", UsageKind::Request, 1_000);
    assert!(decision.allowed);
    assert_eq!(decision.delay_ms, None);
    // Usage is still observed
    assert_eq!(
        limiter.get_status("mystery").unwrap().usage.requests.minute,
        1_000
    );
}

#[test]
fn test_token_ceiling() {
    let (limiter, _clock) = limiter_with(crate::config::default_rate_limits());

    let decision = limiter.check_limit("anthropic", UsageKind::Token, 40_001);
    assert!(!decision.allowed);
    assert_eq!(decision.kind, Some(UsageKind::Token));
    assert!(decision.reason.unwrap().starts_with("tokens minute"));

    assert!(limiter.check_limit("anthropic", UsageKind::Token, 40_000).allowed);
}

#[test]
fn test_window_slides_and_pause_expires() {
    let (limiter, clock) = limiter_with(crate::config::default_rate_limits());
    for _ in 0..5 {
        limiter.record_usage("ideogram", UsageKind::Request, 1);
    }
    assert!(limiter.throttle_state("ideogram").paused);

    clock.advance(Duration::from_secs(60));
    let decision = limiter.check_limit("ideogram", UsageKind::Request, 1);
    assert!(decision.allowed);
    assert_eq!(decision.delay_ms, None);

    let decision = limiter.acquire("ideogram", UsageKind::Request, 1);
    assert!(decision.allowed);
    assert_eq!(decision.delay_ms, None);
    assert!(!limiter.throttle_state("ideogram").paused);
}

#[test]
fn test_check_limit_leaves_expired_pause_alone() {
    let (limiter, clock) = limiter_with(HashMap::from([(
        "svc".to_string(),
        ServiceLimits::requests(WindowLimits::default().with_per_hour(100)),
    )]));
    limiter.record_usage("svc", UsageKind::Request, 95);
    let mut rx = limiter.events().subscribe();

    // Pause expires while the hour window still holds 95 requests
    clock.advance(Duration::from_secs(60));
    let before = limiter.throttle_state("svc");

    let decision = limiter.check_limit("svc", UsageKind::Request, 1);
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("Service paused"));
    assert_eq!(limiter.throttle_state("svc"), before);
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_release_returns_reserved_request() {
    let (limiter, _clock) = limiter_with(per_minute("svc", 2));

    assert!(limiter.acquire("svc", UsageKind::Request, 1).allowed);
    assert!(limiter.acquire("svc", UsageKind::Request, 1).allowed);
    assert!(!limiter.check_limit("svc", UsageKind::Request, 1).allowed);

    limiter.release("svc", UsageKind::Request, 1);
    let status = limiter.get_status("svc").unwrap();
    assert_eq!(status.usage.requests.minute, 1);
    assert_eq!(status.usage.requests.day, 1);
    assert!(limiter.check_limit("svc", UsageKind::Request, 1).allowed);

    // Nothing left to give back is a no-op
    limiter.release("svc", UsageKind::Request, 1);
    limiter.release("svc", UsageKind::Request, 1);
    assert_eq!(limiter.get_status("svc").unwrap().usage.requests.minute, 0);
}

#[test]
fn test_throttle_delay_curve() {
    let config = ThrottleConfig::default();
    assert_eq!(throttle_delay(0.5, &config), Duration::ZERO);
    assert_eq!(throttle_delay(0.79, &config), Duration::ZERO);
    assert_eq!(throttle_delay(0.8, &config), Duration::ZERO);
    assert_eq!(throttle_delay(0.95, &config), Duration::from_millis(5000));
    assert_eq!(throttle_delay(1.4, &config), Duration::from_millis(5000));
    assert_eq!(throttle_delay(f64::NAN, &config), Duration::ZERO);

    let mut previous = Duration::ZERO;
    for step in 0..=150 {
        let usage = 0.8 + f64::from(step) * 0.001;
        let delay = throttle_delay(usage, &config);
        assert!(delay >= previous, "delay decreased at {usage}");
        assert!(delay <= Duration::from_millis(5000));
        previous = delay;
    }
}

#[test]
fn test_slowdown_allows_with_delay() {
    let (limiter, _clock) = limiter_with(per_minute("svc", 100));
    let mut rx = limiter.events().subscribe();

    limiter.record_usage("svc", UsageKind::Request, 85);
    let decision = limiter.check_limit("svc", UsageKind::Request, 1);

    assert!(decision.allowed);
    assert_eq!(decision.delay_ms, Some(1666));
    let state = limiter.throttle_state("svc");
    assert!(state.throttled);
    assert!(!state.paused);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        GovernanceEvent::ServiceThrottled { delay: 1666, .. }
    )));
}

#[test]
fn test_throttled_event_only_on_change() {
    let (limiter, _clock) = limiter_with(per_minute("svc", 100));
    let mut rx = limiter.events().subscribe();

    limiter.record_usage("svc", UsageKind::Request, 85);
    limiter.evaluate_all();
    limiter.evaluate_all();

    let throttled = drain(&mut rx)
        .into_iter()
        .filter(|e| e.kind() == "service:throttled")
        .count();
    assert_eq!(throttled, 1);
}

#[test]
fn test_pause_denies_until_elapsed() {
    let (limiter, clock) = limiter_with(per_minute("svc", 100));
    let mut rx = limiter.events().subscribe();

    limiter.record_usage("svc", UsageKind::Request, 95);
    let state = limiter.throttle_state("svc");
    assert!(state.paused && state.throttled);

    let decision = limiter.check_limit("svc", UsageKind::Request, 1);
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("Service paused"));
    assert_eq!(decision.delay_ms, Some(60_000));

    clock.advance(Duration::from_secs(30));
    limiter.evaluate_all();
    let decision = limiter.check_limit("svc", UsageKind::Request, 1);
    assert_eq!(decision.delay_ms, Some(30_000));
    assert_eq!(limiter.pause_remaining("svc"), Duration::from_secs(30));

    let paused = drain(&mut rx)
        .into_iter()
        .filter(|e| e.kind() == "service:paused")
        .count();
    assert_eq!(paused, 1);
}

#[test]
fn test_recovery_on_evaluate_all() {
    let (limiter, clock) = limiter_with(per_minute("svc", 100));
    let mut rx = limiter.events().subscribe();

    limiter.record_usage("svc", UsageKind::Request, 85);
    clock.advance(Duration::from_secs(61));
    limiter.evaluate_all();

    let state = limiter.throttle_state("svc");
    assert!(!state.throttled);
    assert_eq!(state.delay_ms, 0);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, GovernanceEvent::ServiceRecovered { service, .. } if service == "svc")));
}

#[test]
fn test_quota_alerts_once_per_day() {
    let (limiter, clock) = limiter_with(per_minute("svc", 100));
    let mut rx = limiter.events().subscribe();

    limiter.record_usage("svc", UsageKind::Request, 50);
    limiter.record_usage("svc", UsageKind::Request, 30);
    assert_eq!(alert_thresholds(&drain(&mut rx)), vec![0.5, 0.75]);

    // New minute, same day: nothing repeats
    clock.advance(Duration::from_secs(61));
    limiter.record_usage("svc", UsageKind::Request, 80);
    assert!(alert_thresholds(&drain(&mut rx)).is_empty());

    clock.advance(Duration::from_secs(86_400));
    limiter.record_usage("svc", UsageKind::Request, 50);
    assert_eq!(alert_thresholds(&drain(&mut rx)), vec![0.5]);
}

#[test]
fn test_quota_alert_carries_usage() {
    let (limiter, _clock) = limiter_with(per_minute("svc", 10));
    let mut rx = limiter.events().subscribe();

    limiter.record_usage("svc", UsageKind::Request, 5);
    let alert = drain(&mut rx)
        .into_iter()
        .find(|e| e.kind() == "quota:alert")
        .unwrap();
    match alert {
        GovernanceEvent::QuotaAlert {
            usage,
            limits,
            current_usage,
            ..
        } => {
            assert!((usage - 0.5).abs() < f64::EPSILON);
            assert_eq!(limits.requests.per_minute, Some(10));
            assert_eq!(current_usage.requests.minute, 5);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_acquire_never_overshoots_under_contention() {
    let (limiter, _clock) = limiter_with(per_minute("svc", 10));
    let limiter = Arc::new(limiter);

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire("svc", UsageKind::Request, 1) })
        })
        .collect();
    let decisions = futures::future::join_all(handles).await;

    let allowed = decisions
        .into_iter()
        .map(|d| d.unwrap())
        .filter(|d| d.allowed)
        .count();
    assert_eq!(allowed, 10);
    assert_eq!(limiter.get_status("svc").unwrap().usage.requests.minute, 10);
}

#[test]
fn test_cleanup_purges_expired_entries() {
    let (limiter, clock) = limiter_with(per_minute("svc", 100));
    limiter.record_usage("svc", UsageKind::Request, 1);
    limiter.record_usage("other", UsageKind::Token, 500);

    assert_eq!(limiter.cleanup(), 0);
    clock.advance(Duration::from_secs(120));
    assert_eq!(limiter.cleanup(), 2);
    assert_eq!(limiter.get_status("other").unwrap().usage.tokens.hour, 500);
}

#[test]
fn test_reset_clears_service() {
    let (limiter, _clock) = limiter_with(per_minute("svc", 10));
    for _ in 0..10 {
        limiter.acquire("svc", UsageKind::Request, 1);
    }
    assert!(!limiter.check_limit("svc", UsageKind::Request, 1).allowed);

    limiter.reset("svc");
    assert!(limiter.check_limit("svc", UsageKind::Request, 1).allowed);
    assert_eq!(limiter.throttle_state("svc"), ThrottleState::default());
}

#[test]
fn test_status_snapshots() {
    let limits = HashMap::from([(
        "svc".to_string(),
        ServiceLimits::requests(WindowLimits::per_minute(100).with_per_hour(1000)),
    )]);
    let (limiter, _clock) = limiter_with(limits);
    limiter.record_usage("svc", UsageKind::Request, 50);
    limiter.record_usage("adhoc", UsageKind::Request, 1);

    let status = limiter.get_status("svc").unwrap();
    assert_eq!(status.percentages.requests.minute, Some(0.5));
    assert_eq!(status.percentages.requests.hour, Some(0.05));
    assert_eq!(status.percentages.requests.day, None);
    assert_eq!(status.percentages.max(), 0.5);

    let names: Vec<_> = limiter
        .get_all_status()
        .into_iter()
        .map(|s| s.service)
        .collect();
    assert_eq!(names, vec!["adhoc", "svc"]);
    assert!(limiter.get_status("nobody").is_none());

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["throttle"]["throttled"], false);
    assert_eq!(json["usage"]["requests"]["minute"], 50);
}

#[test]
fn test_decision_display_and_retry_after() {
    let denied = LimitDecision::window_exceeded(
        UsageKind::Request,
        Window::Hour,
        100,
        100,
        Duration::from_secs(10),
    );
    assert_eq!(denied.to_string(), "requests hour limit exceeded (100/100)");
    assert_eq!(denied.retry_after(), Some(Duration::from_secs(10)));

    let paused = LimitDecision::paused(Duration::from_secs(5));
    assert_eq!(paused.retry_after(), Some(Duration::from_secs(5)));
    assert_eq!(LimitDecision::allow().retry_after(), None);
    assert_eq!(LimitDecision::allow().to_string(), "allowed");
}
