//! Per-mapping placeholder numbering.

use std::collections::HashMap;
use std::sync::Mutex;

/// Monotonic per-entity-type counter.
///
/// Lives inside a single [`Mapping`](crate::anonymize::Mapping) and dies
/// with it; there is no global numbering state. Numbers start at 1 and
/// never rewind. Callers allocate a number and insert the resulting
/// placeholder under one mapping lock, so gaps cannot occur.
#[derive(Debug, Default)]
pub struct PlaceholderCounter {
    counters: Mutex<HashMap<String, u32>>,
}

impl PlaceholderCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next index for `entity_type`, starting at 1.
    pub fn next(&self, entity_type: &str) -> u32 {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let slot = counters.entry(entity_type.to_string()).or_insert(0);
        *slot += 1;
        *slot
    }

    /// Current count for `entity_type` (0 if never used).
    pub fn current(&self, entity_type: &str) -> u32 {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.get(entity_type).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one_per_type() {
        let counter = PlaceholderCounter::new();
        assert_eq!(counter.next("PERSON"), 1);
        assert_eq!(counter.next("PERSON"), 2);
        assert_eq!(counter.next("PHONE"), 1);
        assert_eq!(counter.current("PERSON"), 2);
        assert_eq!(counter.current("EMAIL"), 0);
    }

    #[test]
    fn concurrent_allocation_yields_unique_dense_numbers() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let counter = Arc::new(PlaceholderCounter::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = counter.clone();
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| counter.next("PERSON")).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for n in handle.join().expect("thread") {
                assert!(seen.insert(n), "duplicate index {n}");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(counter.current("PERSON"), 800);
    }
}
