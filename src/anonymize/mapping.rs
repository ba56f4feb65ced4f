//! Bidirectional placeholder ↔ original value mapping.
//!
//! One mapping is owned by one request lifetime. It holds the forward
//! index (entity type + original → wire token), the reverse index (wire
//! token → original), and the hash-strategy shadow index. Insertion is
//! idempotent: the same (entity type, original) pair always yields the
//! same wire token, and values that normalize equal (formatting variants
//! of one phone number, case variants of one email) collapse to a single
//! token. Contents are append-only until the mapping is destroyed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anonymize::counter::PlaceholderCounter;

/// A reversible association recorded in the mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub original: String,
    pub entity_type: String,
}

#[derive(Debug, Default)]
struct MappingInner {
    /// (entity_type, original) → wire token.
    forward: HashMap<(String, String), String>,
    /// (entity_type, normalized original) → wire token, for repeat
    /// collapse across formatting variants.
    normalized: HashMap<(String, String), String>,
    /// wire token → entry. Covers placeholders and synthetic fakes.
    reverse: HashMap<String, MappingEntry>,
    /// digest → entry, for the hash strategy.
    hashes: HashMap<String, MappingEntry>,
}

/// Per-request bidirectional mapping with its own placeholder counter.
pub struct Mapping {
    id: String,
    tenant: String,
    created_at: DateTime<Utc>,
    counter: PlaceholderCounter,
    inner: Mutex<MappingInner>,
}

impl Mapping {
    pub fn new(tenant: &str) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), tenant)
    }

    pub fn with_id(id: String, tenant: &str) -> Self {
        Self {
            id,
            tenant: tenant.to_string(),
            created_at: Utc::now(),
            counter: PlaceholderCounter::new(),
            inner: Mutex::new(MappingInner::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Look up or create the wire token for `(entity_type, original)`.
    ///
    /// `make_token` receives the allocated index and produces the wire
    /// form (`<TYPE_N>` for the placeholder strategy, a fake value for the
    /// synthetic strategy). Allocation and insertion happen under one
    /// lock, so numbering stays dense and tokens are never duplicated.
    pub fn get_or_assign(
        &self,
        entity_type: &str,
        original: &str,
        normalized: &str,
        make_token: impl FnOnce(u32) -> String,
    ) -> String {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let forward_key = (entity_type.to_string(), original.to_string());
        if let Some(existing) = inner.forward.get(&forward_key) {
            return existing.clone();
        }

        let normalized_key = (entity_type.to_string(), normalized.to_string());
        if let Some(existing) = inner.normalized.get(&normalized_key) {
            let token = existing.clone();
            inner.forward.insert(forward_key, token.clone());
            return token;
        }

        let token = make_token(self.counter.next(entity_type));
        inner.forward.insert(forward_key, token.clone());
        inner.normalized.insert(normalized_key, token.clone());
        inner.reverse.insert(
            token.clone(),
            MappingEntry {
                original: original.to_string(),
                entity_type: entity_type.to_string(),
            },
        );
        token
    }

    /// Record a hash-strategy digest in the shadow index. Idempotent.
    pub fn insert_hash(&self, digest: &str, original: &str, entity_type: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.hashes.entry(digest.to_string()).or_insert(MappingEntry {
            original: original.to_string(),
            entity_type: entity_type.to_string(),
        });
    }

    /// Original value for a wire token (placeholder or synthetic fake).
    pub fn original_for(&self, token: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.reverse.get(token).map(|e| e.original.clone())
    }

    /// Original value for a hash-strategy digest.
    pub fn original_for_digest(&self, digest: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.hashes.get(digest).map(|e| e.original.clone())
    }

    /// Every wire token in the mapping.
    pub fn tokens(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.reverse.keys().cloned().collect()
    }

    /// (wire token, original) pairs whose wire form is NOT a grammar
    /// placeholder — synthetic fakes plus hash digests. These restore via
    /// literal substring replacement rather than the placeholder scan.
    pub fn literal_entries(&self) -> Vec<(String, String)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut literals: Vec<(String, String)> = inner
            .reverse
            .iter()
            .filter(|(token, _)| !crate::deanonymize::is_placeholder(token))
            .map(|(token, entry)| (token.clone(), entry.original.clone()))
            .collect();
        literals.extend(
            inner
                .hashes
                .iter()
                .map(|(digest, entry)| (digest.clone(), entry.original.clone())),
        );
        literals
    }

    /// Number of reversible entries (hash shadow entries excluded).
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot for persistence in the mapping store.
    pub fn to_record(&self, ttl_seconds: u64) -> MappingRecord {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        MappingRecord {
            id: self.id.clone(),
            tenant: self.tenant.clone(),
            created_at: self.created_at,
            ttl_seconds,
            entries: inner
                .reverse
                .iter()
                .map(|(token, entry)| (token.clone(), entry.clone()))
                .collect(),
            hashes: inner
                .hashes
                .iter()
                .map(|(digest, entry)| (digest.clone(), entry.clone()))
                .collect(),
        }
    }
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("id", &self.id)
            .field("tenant", &self.tenant)
            .field("entries", &self.len())
            .finish()
    }
}

/// Serialized form of a mapping, as persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRecord {
    pub id: String,
    pub tenant: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    /// Wire token → entry; keys are placeholders or synthetic fakes.
    pub entries: BTreeMap<String, MappingEntry>,
    /// Hash-strategy shadow index: digest → entry.
    #[serde(default)]
    pub hashes: BTreeMap<String, MappingEntry>,
}

impl MappingRecord {
    /// Rebuild an in-memory mapping from a stored record.
    pub fn into_mapping(self) -> Mapping {
        let mapping = Mapping {
            id: self.id,
            tenant: self.tenant,
            created_at: self.created_at,
            counter: PlaceholderCounter::new(),
            inner: Mutex::new(MappingInner::default()),
        };
        {
            let mut inner = mapping.inner.lock().unwrap_or_else(|e| e.into_inner());
            for (token, entry) in self.entries {
                inner
                    .forward
                    .insert((entry.entity_type.clone(), entry.original.clone()), token.clone());
                inner.reverse.insert(token, entry);
            }
            for (digest, entry) in self.hashes {
                inner.hashes.insert(digest, entry);
            }
        }
        mapping
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let deadline = self.created_at + chrono::Duration::seconds(self.ttl_seconds as i64);
        now > deadline
    }
}
