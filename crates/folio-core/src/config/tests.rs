use super::*;

#[test]
fn test_defaults() {
    let config = GovernanceConfig::default();
    assert_eq!(config.throttle.slowdown_threshold, 0.8);
    assert_eq!(config.throttle.pause_threshold, 0.95);
    assert_eq!(config.throttle.max_delay_ms, 5000);
    assert_eq!(config.alerts.thresholds, vec![0.5, 0.75, 0.9, 0.95]);
    assert_eq!(config.maintenance.cleanup_interval_secs, 60);
    assert_eq!(config.maintenance.recheck_interval_secs, 10);
    assert_eq!(config.breakers.default.timeout_ms, 30_000);

    let ideogram = config.rate_limits["ideogram"];
    assert_eq!(ideogram.requests.per_minute, Some(5));
    assert!(ideogram.tokens.is_empty());
}

#[test]
fn test_empty_document_uses_defaults() {
    let config: GovernanceConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, GovernanceConfig::default());
}

#[test]
fn test_snake_case_limits_and_overrides() {
    let json = r#"{
        "rate_limits": {
            "ideogram": { "requests": { "per_minute": 3, "per_day": 200 } }
        },
        "throttle": { "pause_secs": 30 },
        "breakers": {
            "services": { "ideogram": { "timeout_ms": 90000, "failure_threshold": 3 } }
        },
        "alerts": { "webhook_url": "https://ops.example.com/hook" }
    }"#;
    let config: GovernanceConfig = serde_json::from_str(json).unwrap();

    let limits = config.rate_limits["ideogram"];
    assert_eq!(limits.requests.get(Window::Minute), Some(3));
    assert_eq!(limits.requests.get(Window::Hour), None);
    assert_eq!(limits.for_kind(UsageKind::Request).per_day, Some(200));
    // An explicit table replaces the built-in services
    assert!(!config.rate_limits.contains_key("anthropic"));

    assert_eq!(config.throttle.pause_secs, 30);
    assert_eq!(config.throttle.slowdown_threshold, 0.8);

    let ideogram = config.breakers.services["ideogram"];
    assert_eq!(ideogram.reset_timeout_ms, 60_000);
    let breaker: CircuitBreakerConfig = ideogram.into();
    assert_eq!(breaker.timeout, Duration::from_secs(90));
    assert_eq!(breaker.failure_threshold, 3);

    assert_eq!(
        config.alerts.webhook_url.as_deref(),
        Some("https://ops.example.com/hook")
    );
}

#[test]
fn test_window_limit_builders() {
    let limits = WindowLimits::per_minute(50).with_per_hour(1000).with_per_day(9000);
    assert_eq!(limits.get(Window::Day), Some(9000));
    assert!(!limits.is_empty());
    assert!(WindowLimits::default().is_empty());
}
