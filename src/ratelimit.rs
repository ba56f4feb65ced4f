//! Per-tenant request rate limiting.
//!
//! Each tenant carries two counters: requests in the current window and
//! requests in the one before it. The effective rate is the current
//! count plus the previous count weighted by how much of the previous
//! window still overlaps the sliding interval, so a burst cannot double
//! up at a window boundary the way it can under a plain fixed window.
//! All tenants live in one map behind a single short-lived lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Windows a tenant may sit idle before its entry is pruned.
const IDLE_WINDOWS: u32 = 4;

/// Map size at which a check opportunistically prunes idle tenants.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct TenantWindow {
    window_start: Instant,
    current: u64,
    previous: u64,
}

/// Sliding-window limiter keyed by tenant.
pub struct RateLimiter {
    max_requests: u64,
    window: Duration,
    enabled: bool,
    tenants: Mutex<HashMap<String, TenantWindow>>,
}

impl RateLimiter {
    pub fn new(max_requests: u64, window: Duration, enabled: bool) -> Self {
        Self {
            max_requests,
            window,
            enabled,
            tenants: Mutex::new(HashMap::new()),
        }
    }

    /// Try to admit one request for `tenant`. Returns `true` if the
    /// weighted rate stays within the limit.
    pub fn check(&self, tenant: &str) -> bool {
        if !self.enabled || self.window.is_zero() {
            return true;
        }
        if self.max_requests == 0 {
            return false;
        }

        let now = Instant::now();
        let mut tenants = self.tenants.lock().unwrap_or_else(|e| e.into_inner());

        if tenants.len() >= PRUNE_THRESHOLD {
            let cutoff = self.window * IDLE_WINDOWS;
            tenants.retain(|_, w| now.duration_since(w.window_start) < cutoff);
        }

        let entry = tenants
            .entry(tenant.to_string())
            .or_insert_with(|| TenantWindow {
                window_start: now,
                current: 0,
                previous: 0,
            });

        // Roll the window forward. More than two windows of silence
        // clears all history.
        let elapsed = now.duration_since(entry.window_start);
        if elapsed >= self.window * 2 {
            entry.previous = 0;
            entry.current = 0;
            entry.window_start = now;
        } else if elapsed >= self.window {
            entry.previous = entry.current;
            entry.current = 0;
            entry.window_start += self.window;
        }

        let into_window = now
            .duration_since(entry.window_start)
            .as_secs_f64()
            / self.window.as_secs_f64();
        let weighted = entry.previous as f64 * (1.0 - into_window) + entry.current as f64;
        if weighted + 1.0 > self.max_requests as f64 {
            return false;
        }

        entry.current += 1;
        true
    }

    /// Number of tenants currently tracked.
    pub fn tenant_count(&self) -> usize {
        self.tenants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
