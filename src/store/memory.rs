//! In-process mapping store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::anonymize::MappingRecord;
use crate::error::StoreError;
use crate::store::MappingStore;

/// HashMap-backed store with TTL expiry.
///
/// Expiry is enforced on read and by a low-frequency background sweep;
/// the lock is never held across an await point.
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, MappingRecord>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a background task sweeping expired records every `interval`.
    /// The task holds only a weak handle footprint (a clone of the inner
    /// map) and exits with the runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let records = self.records.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                let removed = {
                    let mut guard = records.lock().unwrap_or_else(|e| e.into_inner());
                    let before = guard.len();
                    guard.retain(|_, record| !record.is_expired_at(now));
                    before - guard.len()
                };
                if removed > 0 {
                    tracing::debug!(removed, "mapping store sweep");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn put(&self, record: MappingRecord) -> Result<(), StoreError> {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if guard.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        guard.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, mapping_id: &str) -> Result<Option<MappingRecord>, StoreError> {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        match guard.get(mapping_id) {
            Some(record) if record.is_expired_at(Utc::now()) => {
                guard.remove(mapping_id);
                Ok(None)
            }
            Some(record) => Ok(Some(record.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, mapping_id: &str) -> Result<(), StoreError> {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(mapping_id);
        Ok(())
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|_, record| !record.is_expired_at(now));
        Ok(before - guard.len())
    }
}
