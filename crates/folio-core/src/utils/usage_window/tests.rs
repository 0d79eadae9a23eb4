use super::*;
use chrono::TimeZone;

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
}

#[test]
fn test_window_lengths() {
    assert_eq!(Window::Minute.duration(), Duration::from_secs(60));
    assert_eq!(Window::Hour.duration(), Duration::from_secs(3600));
    assert_eq!(Window::Day.duration(), Duration::from_secs(86_400));
}

#[test]
fn test_next_boundary_is_aligned() {
    let now = at(9, 30, 15);
    assert_eq!(Window::Minute.next_boundary(now), at(9, 31, 0));
    assert_eq!(Window::Hour.next_boundary(now), at(10, 0, 0));
    assert_eq!(
        Window::Day.next_boundary(now),
        Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap()
    );
    assert_eq!(Window::Minute.reset_in(now), Duration::from_secs(45));
}

#[test]
fn test_boundary_from_exact_start_moves_forward() {
    let now = at(9, 30, 0);
    assert_eq!(Window::Minute.next_boundary(now), at(9, 31, 0));
}

#[test]
fn test_record_counts_in_every_window() {
    let mut usage = ServiceUsage::default();
    usage.record(UsageKind::Request, 1, at(9, 0, 0));
    usage.record(UsageKind::Token, 1500, at(9, 0, 0));
    usage.record(UsageKind::Request, 1, at(9, 0, 10));

    let counts = usage.counts();
    assert_eq!(counts.requests.minute, 2);
    assert_eq!(counts.requests.hour, 2);
    assert_eq!(counts.requests.day, 2);
    assert_eq!(counts.tokens.get(Window::Hour), 1500);
}

#[test]
fn test_purge_drops_only_expired_windows() {
    let mut usage = ServiceUsage::default();
    usage.record(UsageKind::Request, 1, at(9, 0, 0));
    usage.record(UsageKind::Request, 1, at(9, 0, 30));

    // 60s after the first entry it leaves the minute window only
    let removed = usage.purge(at(9, 1, 0));
    assert_eq!(removed, 1);
    assert_eq!(usage.current(UsageKind::Request, Window::Minute), 1);
    assert_eq!(usage.current(UsageKind::Request, Window::Hour), 2);

    let removed = usage.purge(at(10, 0, 30));
    assert_eq!(removed, 3);
    assert_eq!(usage.current(UsageKind::Request, Window::Hour), 0);
    assert_eq!(usage.current(UsageKind::Request, Window::Day), 2);
}

#[test]
fn test_entries_stay_time_ordered() {
    let mut usage = ServiceUsage::default();
    for s in [0, 5, 9] {
        usage.record(UsageKind::Request, 1, at(9, 0, s));
    }
    let stamps: Vec<_> = usage
        .entries(UsageKind::Request, Window::Minute)
        .map(|e| e.timestamp)
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_store_purges_on_read() {
    let mut store = UsageWindowStore::new();
    store.record("ideogram", UsageKind::Request, 1, at(9, 0, 0));
    store.record("ideogram", UsageKind::Request, 1, at(9, 0, 45));

    assert_eq!(
        store.current("ideogram", UsageKind::Request, Window::Minute, at(9, 0, 50)),
        2
    );
    assert_eq!(
        store.current("ideogram", UsageKind::Request, Window::Minute, at(9, 1, 10)),
        1
    );
    assert_eq!(store.counts("unknown", at(9, 1, 10)), UsageCounts::default());
}

#[test]
fn test_store_purge_all_and_clear() {
    let mut store = UsageWindowStore::new();
    store.record("anthropic", UsageKind::Request, 1, at(9, 0, 0));
    store.record("openai", UsageKind::Request, 1, at(9, 0, 0));

    assert_eq!(store.purge_all(at(9, 2, 0)), 2);
    assert_eq!(store.counts("openai", at(9, 2, 0)).requests.hour, 1);

    store.clear("openai");
    let services: Vec<_> = store.services().collect();
    assert_eq!(services, vec!["anthropic"]);
}
