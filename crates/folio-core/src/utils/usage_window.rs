//! Sliding usage windows
//!
//! Per-service counters of requests and tokens over the last minute, hour
//! and day. Entries are appended in timestamp order and purged lazily once
//! they fall out of their window.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// What a usage entry counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    /// One API request
    Request,
    /// Model tokens
    Token,
}

impl UsageKind {
    /// Both kinds
    pub const ALL: [UsageKind; 2] = [UsageKind::Request, UsageKind::Token];

    /// Plural label used in reasons and snapshots
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Request => "requests",
            Self::Token => "tokens",
        }
    }
}

impl std::fmt::Display for UsageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Token => write!(f, "token"),
        }
    }
}

/// Sliding window length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// Last 60 seconds
    Minute,
    /// Last 3600 seconds
    Hour,
    /// Last 86400 seconds
    Day,
}

impl Window {
    /// Windows in evaluation order
    pub const ALL: [Window; 3] = [Window::Minute, Window::Hour, Window::Day];

    /// Window length in seconds
    #[must_use]
    pub fn seconds(&self) -> i64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }

    /// Window length
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds().unsigned_abs())
    }

    /// Start of the next aligned window (e.g. the next full minute)
    #[must_use]
    pub fn next_boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.seconds();
        let next = (now.timestamp().div_euclid(period) + 1) * period;
        Utc.timestamp_opt(next, 0).single().unwrap_or(now)
    }

    /// Time until the next aligned window starts
    #[must_use]
    pub fn reset_in(&self, now: DateTime<Utc>) -> Duration {
        (self.next_boundary(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
        }
    }
}

/// One recorded unit of usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageEntry {
    /// When the usage was recorded
    pub timestamp: DateTime<Utc>,
    /// Requests or tokens consumed
    pub amount: u64,
}

/// Counts per window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounts {
    /// Usage over the last minute
    pub minute: u64,
    /// Usage over the last hour
    pub hour: u64,
    /// Usage over the last day
    pub day: u64,
}

impl WindowCounts {
    /// Count for a window
    #[must_use]
    pub fn get(&self, window: Window) -> u64 {
        match window {
            Window::Minute => self.minute,
            Window::Hour => self.hour,
            Window::Day => self.day,
        }
    }
}

/// Request and token counts for one service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounts {
    /// Request counts
    pub requests: WindowCounts,
    /// Token counts
    pub tokens: WindowCounts,
}

impl UsageCounts {
    /// Counts for a usage kind
    #[must_use]
    pub fn for_kind(&self, kind: UsageKind) -> &WindowCounts {
        match kind {
            UsageKind::Request => &self.requests,
            UsageKind::Token => &self.tokens,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct WindowSeries {
    minute: VecDeque<UsageEntry>,
    hour: VecDeque<UsageEntry>,
    day: VecDeque<UsageEntry>,
}

impl WindowSeries {
    fn entries(&self, window: Window) -> &VecDeque<UsageEntry> {
        match window {
            Window::Minute => &self.minute,
            Window::Hour => &self.hour,
            Window::Day => &self.day,
        }
    }

    fn entries_mut(&mut self, window: Window) -> &mut VecDeque<UsageEntry> {
        match window {
            Window::Minute => &mut self.minute,
            Window::Hour => &mut self.hour,
            Window::Day => &mut self.day,
        }
    }

    fn push(&mut self, entry: UsageEntry) {
        for window in Window::ALL {
            self.entries_mut(window).push_back(entry);
        }
    }

    fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for window in Window::ALL {
            let span = chrono::Duration::seconds(window.seconds());
            let entries = self.entries_mut(window);
            // Entries are time-ascending, so expired ones sit at the front
            while entries.front().is_some_and(|e| now - e.timestamp >= span) {
                entries.pop_front();
                removed += 1;
            }
        }
        removed
    }

    fn remove_latest(&mut self, amount: u64) -> bool {
        // The day window holds the reservation longest
        let Some(target) = self.day.iter().rev().find(|e| e.amount == amount).copied() else {
            return false;
        };
        for window in Window::ALL {
            let entries = self.entries_mut(window);
            if let Some(pos) = entries.iter().rposition(|e| *e == target) {
                entries.remove(pos);
            }
        }
        true
    }

    fn counts(&self) -> WindowCounts {
        let sum = |w| self.entries(w).iter().map(|e| e.amount).sum();
        WindowCounts {
            minute: sum(Window::Minute),
            hour: sum(Window::Hour),
            day: sum(Window::Day),
        }
    }

    fn is_empty(&self) -> bool {
        self.day.is_empty() && self.hour.is_empty() && self.minute.is_empty()
    }
}

/// Sliding usage of one service
#[derive(Debug, Clone, Default)]
pub struct ServiceUsage {
    requests: WindowSeries,
    tokens: WindowSeries,
}

impl ServiceUsage {
    fn series(&self, kind: UsageKind) -> &WindowSeries {
        match kind {
            UsageKind::Request => &self.requests,
            UsageKind::Token => &self.tokens,
        }
    }

    fn series_mut(&mut self, kind: UsageKind) -> &mut WindowSeries {
        match kind {
            UsageKind::Request => &mut self.requests,
            UsageKind::Token => &mut self.tokens,
        }
    }

    /// Append usage to all three windows
    pub fn record(&mut self, kind: UsageKind, amount: u64, now: DateTime<Utc>) {
        self.series_mut(kind).push(UsageEntry {
            timestamp: now,
            amount,
        });
    }

    /// Remove the most recent entry of `amount`, returning whether one was held
    pub fn release(&mut self, kind: UsageKind, amount: u64) -> bool {
        self.series_mut(kind).remove_latest(amount)
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge(&mut self, now: DateTime<Utc>) -> usize {
        self.requests.purge(now) + self.tokens.purge(now)
    }

    /// Current usage of one kind in one window
    ///
    /// Callers purge first; this only sums what is held.
    #[must_use]
    pub fn current(&self, kind: UsageKind, window: Window) -> u64 {
        self.series(kind).entries(window).iter().map(|e| e.amount).sum()
    }

    /// All counts
    #[must_use]
    pub fn counts(&self) -> UsageCounts {
        UsageCounts {
            requests: self.requests.counts(),
            tokens: self.tokens.counts(),
        }
    }

    /// Entries held for one kind and window, oldest first
    pub fn entries(&self, kind: UsageKind, window: Window) -> impl Iterator<Item = &UsageEntry> {
        self.series(kind).entries(window).iter()
    }

    /// Whether nothing is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.tokens.is_empty()
    }
}

/// Usage windows for every service
#[derive(Debug, Clone, Default)]
pub struct UsageWindowStore {
    services: HashMap<String, ServiceUsage>,
}

impl UsageWindowStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record usage for a service
    pub fn record(&mut self, service: &str, kind: UsageKind, amount: u64, now: DateTime<Utc>) {
        self.services
            .entry(service.to_string())
            .or_default()
            .record(kind, amount, now);
    }

    /// Take back the most recent `amount` recorded for a service
    pub fn release(&mut self, service: &str, kind: UsageKind, amount: u64) -> bool {
        self.services
            .get_mut(service)
            .is_some_and(|u| u.release(kind, amount))
    }

    /// Purge one service, returning its usage
    pub fn purged(&mut self, service: &str, now: DateTime<Utc>) -> Option<&ServiceUsage> {
        let usage = self.services.get_mut(service)?;
        usage.purge(now);
        Some(usage)
    }

    /// Purge every service, returning how many entries were removed
    pub fn purge_all(&mut self, now: DateTime<Utc>) -> usize {
        self.services.values_mut().map(|u| u.purge(now)).sum()
    }

    /// Current usage of one kind in one window (after purging)
    pub fn current(
        &mut self,
        service: &str,
        kind: UsageKind,
        window: Window,
        now: DateTime<Utc>,
    ) -> u64 {
        self.purged(service, now)
            .map_or(0, |u| u.current(kind, window))
    }

    /// Counts for a service (after purging)
    pub fn counts(&mut self, service: &str, now: DateTime<Utc>) -> UsageCounts {
        self.purged(service, now)
            .map(ServiceUsage::counts)
            .unwrap_or_default()
    }

    /// Forget a service entirely
    pub fn clear(&mut self, service: &str) {
        self.services.remove(service);
    }

    /// Services with recorded usage
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests;
