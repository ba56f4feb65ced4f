//! Per-tenant usage quotas.
//!
//! Counters are kept per (tenant, window). The hourly window rolls from
//! first use; daily and monthly windows align to UTC calendar boundaries.
//! The pipeline checks quota before forwarding and records usage only
//! after a successful forward, so failures never consume quota.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};

use crate::config::QuotaConfig;

/// Quota window granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaPeriod {
    Hourly,
    Daily,
    Monthly,
}

/// What is being counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaKind {
    Requests,
    Tokens,
}

#[derive(Debug)]
struct Usage {
    used: u64,
    window_end: DateTime<Utc>,
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Exceeded {
        kind: QuotaKind,
        period: QuotaPeriod,
    },
}

/// Tracks usage counters for every tenant.
pub struct QuotaTracker {
    config: QuotaConfig,
    usage: Mutex<HashMap<(String, QuotaKind, QuotaPeriod), Usage>>,
}

impl QuotaTracker {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config,
            usage: Mutex::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Would one more request fit within every configured limit?
    pub fn check_request(&self, tenant: &str) -> QuotaDecision {
        if !self.config.enabled {
            return QuotaDecision::Allowed;
        }
        let now = Utc::now();
        let checks = [
            (QuotaKind::Requests, QuotaPeriod::Hourly, self.config.hourly_requests),
            (QuotaKind::Requests, QuotaPeriod::Daily, self.config.daily_requests),
        ];
        let mut usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        for (kind, period, limit) in checks {
            if limit == 0 {
                continue;
            }
            let used = current_usage(&mut usage, tenant, kind, period, now);
            if used + 1 > limit {
                return QuotaDecision::Exceeded { kind, period };
            }
        }
        QuotaDecision::Allowed
    }

    /// Record a successful forward: one request plus its token usage.
    pub fn record_success(&self, tenant: &str, tokens: u64) {
        if !self.config.enabled {
            return;
        }
        let now = Utc::now();
        let mut usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        for period in [QuotaPeriod::Hourly, QuotaPeriod::Daily] {
            bump(&mut usage, tenant, QuotaKind::Requests, period, now, 1);
        }
        if tokens > 0 && self.config.monthly_tokens > 0 {
            bump(&mut usage, tenant, QuotaKind::Tokens, QuotaPeriod::Monthly, now, tokens);
        }
    }

    /// Current usage for one (kind, period), for observability.
    pub fn usage(&self, tenant: &str, kind: QuotaKind, period: QuotaPeriod) -> u64 {
        let now = Utc::now();
        let mut usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        current_usage(&mut usage, tenant, kind, period, now)
    }
}

fn current_usage(
    usage: &mut HashMap<(String, QuotaKind, QuotaPeriod), Usage>,
    tenant: &str,
    kind: QuotaKind,
    period: QuotaPeriod,
    now: DateTime<Utc>,
) -> u64 {
    let key = (tenant.to_string(), kind, period);
    match usage.get(&key) {
        Some(entry) if now <= entry.window_end => entry.used,
        Some(_) => {
            usage.remove(&key);
            0
        }
        None => 0,
    }
}

fn bump(
    usage: &mut HashMap<(String, QuotaKind, QuotaPeriod), Usage>,
    tenant: &str,
    kind: QuotaKind,
    period: QuotaPeriod,
    now: DateTime<Utc>,
    amount: u64,
) {
    let key = (tenant.to_string(), kind, period);
    let entry = usage.entry(key).or_insert_with(|| Usage {
        used: 0,
        window_end: window_end(period, now),
    });
    if now > entry.window_end {
        entry.used = 0;
        entry.window_end = window_end(period, now);
    }
    entry.used += amount;
}

fn window_end(period: QuotaPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    match period {
        QuotaPeriod::Hourly => now + ChronoDuration::hours(1),
        QuotaPeriod::Daily => {
            let tomorrow = now.date_naive() + ChronoDuration::days(1);
            Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default())
        }
        QuotaPeriod::Monthly => {
            let (year, month) = if now.month() == 12 {
                (now.year() + 1, 1)
            } else {
                (now.year(), now.month() + 1)
            };
            Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
                .single()
                .unwrap_or(now + ChronoDuration::days(31))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(hourly: u64) -> QuotaTracker {
        QuotaTracker::new(QuotaConfig {
            enabled: true,
            hourly_requests: hourly,
            daily_requests: 0,
            monthly_tokens: 1000,
        })
    }

    #[test]
    fn disabled_tracker_always_allows() {
        let tracker = QuotaTracker::new(QuotaConfig {
            enabled: false,
            hourly_requests: 1,
            daily_requests: 1,
            monthly_tokens: 1,
        });
        for _ in 0..10 {
            assert_eq!(tracker.check_request("t"), QuotaDecision::Allowed);
            tracker.record_success("t", 100);
        }
    }

    #[test]
    fn request_limit_is_enforced() {
        let tracker = tracker(2);
        assert_eq!(tracker.check_request("t"), QuotaDecision::Allowed);
        tracker.record_success("t", 0);
        assert_eq!(tracker.check_request("t"), QuotaDecision::Allowed);
        tracker.record_success("t", 0);

        assert!(matches!(
            tracker.check_request("t"),
            QuotaDecision::Exceeded {
                kind: QuotaKind::Requests,
                period: QuotaPeriod::Hourly,
            }
        ));
    }

    #[test]
    fn tenants_are_isolated() {
        let tracker = tracker(1);
        tracker.record_success("a", 0);
        assert!(matches!(tracker.check_request("a"), QuotaDecision::Exceeded { .. }));
        assert_eq!(tracker.check_request("b"), QuotaDecision::Allowed);
    }

    #[test]
    fn failures_do_not_consume_quota() {
        let tracker = tracker(1);
        // Check without record: the forward failed.
        assert_eq!(tracker.check_request("t"), QuotaDecision::Allowed);
        assert_eq!(tracker.check_request("t"), QuotaDecision::Allowed);
        assert_eq!(tracker.usage("t", QuotaKind::Requests, QuotaPeriod::Hourly), 0);
    }

    #[test]
    fn token_usage_accumulates_monthly() {
        let tracker = tracker(100);
        tracker.record_success("t", 250);
        tracker.record_success("t", 250);
        assert_eq!(tracker.usage("t", QuotaKind::Tokens, QuotaPeriod::Monthly), 500);
    }

    #[test]
    fn monthly_window_end_rolls_over_december() {
        let december = Utc.with_ymd_and_hms(2025, 12, 15, 10, 0, 0).unwrap();
        let end = window_end(QuotaPeriod::Monthly, december);
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }
}
