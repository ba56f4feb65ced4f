//! Response cache with TTL and LRU eviction.
//!
//! Bodies are cached in their *sanitized* form, keyed by a SHA-256 hash of
//! the sanitized request, so two callers whose prompts anonymize to the
//! same text share one entry even though their raw prompts differ. On a
//! hit, the current request's own mapping restores the body.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                ResponseCache                     │
//! │  lookup(key) ──► hit?  sanitized body            │
//! │                  miss? pipeline forwards,        │
//! │                        stores sanitized body     │
//! └──────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::api::types::ChatMessage;
use crate::config::CacheConfig;

/// How often (in lookups) to emit a cache statistics log line.
const STATS_LOG_EVERY_N: u64 = 100;

struct CacheEntry {
    /// Sanitized response body, placeholders intact.
    body: serde_json::Value,
    created_at: Instant,
    last_accessed: Instant,
    hit_count: u64,
}

/// Bounded LRU cache over sanitized upstream responses.
pub struct ResponseCache {
    /// `std::sync::Mutex` (not tokio) — never held across an `.await`
    /// point, so blocking acquisition is safe.
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
    /// Total lookups (hits + misses) for periodic stats logging.
    lookup_count: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: config.ttl,
            max_entries: config.max_entries.max(1),
            lookup_count: AtomicU64::new(0),
        }
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total hits across all live entries.
    pub fn total_hits(&self) -> u64 {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|e| e.hit_count)
            .sum()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Look up a sanitized body. Expired entries read as misses and are
    /// removed in place.
    pub fn lookup(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        let lookup_no = self.lookup_count.fetch_add(1, Ordering::Relaxed) + 1;

        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let result = match guard.get_mut(key) {
            Some(entry) if now.duration_since(entry.created_at) < self.ttl => {
                entry.last_accessed = now;
                entry.hit_count += 1;
                tracing::debug!(hits = entry.hit_count, "response cache hit");
                Some(entry.body.clone())
            }
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        };

        if lookup_no % STATS_LOG_EVERY_N == 0 {
            let total_hits: u64 = guard.values().map(|e| e.hit_count).sum();
            tracing::info!(
                total_lookups = lookup_no,
                total_hits,
                entry_count = guard.len(),
                "response cache statistics"
            );
        }

        result
    }

    /// Insert a sanitized body, evicting expired entries first and the
    /// least-recently-used entry when over capacity.
    pub fn store(&self, key: String, body: serde_json::Value) {
        let now = Instant::now();
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        guard.retain(|_, entry| now.duration_since(entry.created_at) < self.ttl);

        while guard.len() >= self.max_entries {
            let oldest = guard
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    guard.remove(&k);
                }
                None => break,
            }
        }

        guard.insert(
            key,
            CacheEntry {
                body,
                created_at: now,
                last_accessed: now,
                hit_count: 0,
            },
        );
    }
}

/// Deterministic cache key over everything that affects the upstream
/// answer: tenant, model, the sanitized messages, sampling parameters,
/// and any pass-through fields.
pub fn cache_key(
    tenant: &str,
    model: &str,
    sanitized_messages: &[ChatMessage],
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    extra: &serde_json::Map<String, serde_json::Value>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant.as_bytes());
    hasher.update(b"|");
    hasher.update(model.as_bytes());
    hasher.update(b"|");
    if let Ok(json) = serde_json::to_string(sanitized_messages) {
        hasher.update(json.as_bytes());
    }
    hasher.update(b"|");
    if let Some(t) = temperature {
        hasher.update(t.to_le_bytes());
    }
    hasher.update(b"|");
    if let Some(p) = top_p {
        hasher.update(p.to_le_bytes());
    }
    hasher.update(b"|");
    if let Some(m) = max_tokens {
        hasher.update(m.to_le_bytes());
    }
    hasher.update(b"|");
    // serde_json::Map preserves a stable order for identical inputs.
    if let Ok(json) = serde_json::to_string(extra) {
        hasher.update(json.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
