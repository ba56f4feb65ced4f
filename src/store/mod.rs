//! Mapping store: persists mapping records between the request and
//! response halves of a proxied call.
//!
//! Records are keyed by a cryptographically random `mapping_id` and live
//! until the response path deletes them or their TTL passes, whichever
//! comes first. `get` returning absent is a normal outcome — it happens
//! whenever a TTL expires during a slow upstream call — and the pipeline
//! answers with placeholders unrestored rather than blocking or retrying.

pub mod memory;

use async_trait::async_trait;

pub use memory::MemoryStore;

use crate::anonymize::MappingRecord;
use crate::error::StoreError;

/// Persistence seam shared by the in-process backend and any remote
/// key-value backend. The pipeline only ever talks to this trait.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Atomically create a record. Overwriting an existing id is an error.
    async fn put(&self, record: MappingRecord) -> Result<(), StoreError>;

    /// Fetch a record. `None` is normal (expired or already deleted).
    async fn get(&self, mapping_id: &str) -> Result<Option<MappingRecord>, StoreError>;

    /// Delete a record. Idempotent.
    async fn delete(&self, mapping_id: &str) -> Result<(), StoreError>;

    /// Remove expired records; returns how many were dropped.
    async fn sweep(&self) -> Result<usize, StoreError>;
}
