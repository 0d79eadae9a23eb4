//! Throttle curve and quota alert bookkeeping

use crate::config::ThrottleConfig;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::time::Duration;

/// Advisory delay for a usage share.
///
/// Zero below the slowdown threshold, then a linear ramp that reaches
/// `max_delay_ms` at the pause threshold and stays there.
#[must_use]
pub fn throttle_delay(max_usage: f64, config: &ThrottleConfig) -> Duration {
    if max_usage.is_nan() || max_usage < config.slowdown_threshold {
        return Duration::ZERO;
    }
    let span = config.pause_threshold - config.slowdown_threshold;
    if max_usage >= config.pause_threshold || span <= 0.0 {
        return Duration::from_millis(config.max_delay_ms);
    }
    let progress = (max_usage - config.slowdown_threshold) / span;
    let ms = (progress * config.max_delay_ms as f64).floor();
    Duration::from_millis((ms as u64).min(config.max_delay_ms))
}

/// Throttle level for a usage share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    Normal,
    Slowdown(Duration),
    Paused,
}

pub(crate) fn classify(max_usage: f64, config: &ThrottleConfig) -> Level {
    if max_usage >= config.pause_threshold {
        Level::Paused
    } else if max_usage >= config.slowdown_threshold {
        Level::Slowdown(throttle_delay(max_usage, config))
    } else {
        Level::Normal
    }
}

/// Quota alerts already sent, one per threshold per service per day
#[derive(Debug, Default)]
pub(crate) struct QuotaAlertLedger {
    sent: HashSet<(String, u32, NaiveDate)>,
}

impl QuotaAlertLedger {
    /// Thresholds reached by `usage` that have not fired today.
    ///
    /// Marks them as sent. Entries from earlier days are dropped.
    pub(crate) fn newly_crossed(
        &mut self,
        service: &str,
        usage: f64,
        thresholds: &[f64],
        today: NaiveDate,
    ) -> Vec<f64> {
        self.sent.retain(|(_, _, day)| *day == today);

        let mut crossed = Vec::new();
        for &threshold in thresholds {
            if usage < threshold {
                continue;
            }
            let key = (service.to_string(), permille(threshold), today);
            if self.sent.insert(key) {
                crossed.push(threshold);
            }
        }
        crossed
    }

    pub(crate) fn forget(&mut self, service: &str) {
        self.sent.retain(|(s, _, _)| s != service);
    }
}

fn permille(threshold: f64) -> u32 {
    (threshold * 1000.0).round().clamp(0.0, u32::MAX as f64) as u32
}
