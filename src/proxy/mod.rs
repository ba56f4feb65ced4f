//! The request pipeline.
//!
//! ```text
//! RECEIVED → SECRET-SCAN → ANONYMIZE → CACHE-LOOKUP → QUOTA-CHECK
//!          → FORWARD-UPSTREAM → { STREAMING | UNARY } → RESTORE
//!          → CACHE-STORE → RESPOND
//! ```
//!
//! A blocked secret scan terminates before any mapping exists. Once a
//! mapping has been persisted it is always released: deleted on every
//! exit path, or reclaimed by the store's TTL if the process dies first.
//! Cache entries hold *sanitized* bodies keyed by the sanitized request,
//! so distinct callers share hits and each restores with its own mapping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::anonymize::{Anonymizer, Mapping, StrategyTable};
use crate::api::types::{ChatChunk, ChatMessage, ChatRequest};
use crate::cache::{cache_key, ResponseCache};
use crate::config::Config;
use crate::deanonymize::{Deanonymizer, StreamBuffer};
use crate::detect::secrets::{ScanAction, SecretScanner};
use crate::detect::{patterns, Allowlist, DetectorRegistry};
use crate::error::{Error, ProxyError};
use crate::quota::{QuotaDecision, QuotaTracker};
use crate::store::{MappingStore, MemoryStore};
use crate::upstream::UpstreamClient;

/// System message instructing the upstream model to leave placeholder
/// tokens untouched. Prepended message-level, never spliced into caller
/// content.
pub const PLACEHOLDER_PRESERVATION_PROMPT: &str = "\
IMPORTANT: This conversation contains placeholder tokens of the form <TYPE_N>, \
for example <PERSON_1> or <PHONE_2>. These tokens stand in for redacted values. \
You MUST reproduce them exactly as written whenever you refer to the same entity. \
Do not modify, translate, re-bracket, or explain them. \
Example: if asked to greet <PERSON_1>, answer \"Hello <PERSON_1>!\".";

/// Everything the pipeline needs, built once at startup and shared across
/// request tasks. Per-request state (mapping, stream buffer, cache key)
/// lives on the request's own stack.
pub struct ProxyService {
    anonymizer: Anonymizer,
    deanonymizer: Deanonymizer,
    scanner: Option<SecretScanner>,
    store: Arc<dyn MappingStore>,
    cache: Option<ResponseCache>,
    quota: Arc<QuotaTracker>,
    upstream: UpstreamClient,
    inject_prompt: bool,
    mapping_ttl: Duration,
    max_placeholder_length: usize,
}

impl ProxyService {
    /// Assemble the pipeline from configuration: builtin detectors plus
    /// any custom patterns, the allowlist directory, preset strategy
    /// table, in-process mapping store with a background sweeper.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let mut detectors = patterns::builtin_detectors();
        if let Some(path) = &config.anonymize.custom_pattern_path {
            detectors.extend(patterns::load_custom_detectors(path)?);
        }
        let allowlist = match &config.anonymize.allowlist_dir {
            Some(dir) => Allowlist::from_dir(dir)?,
            None => Allowlist::default(),
        };
        let registry = Arc::new(DetectorRegistry::new(
            detectors,
            allowlist,
            config.anonymize.score_threshold,
        ));

        let store = MemoryStore::new();
        store.spawn_sweeper(config.store.sweep_interval);

        Ok(Self {
            anonymizer: Anonymizer::new(
                registry,
                StrategyTable::for_preset(config.anonymize.compliance_preset),
            ),
            deanonymizer: Deanonymizer::new(
                config.anonymize.fuzzy_enabled,
                config.anonymize.fuzzy_confidence_threshold,
                config.anonymize.max_placeholder_length,
            ),
            scanner: config
                .secrets
                .enabled
                .then(|| SecretScanner::new(config.anonymize.compliance_preset)),
            store: Arc::new(store),
            cache: config.cache.enabled.then(|| ResponseCache::new(&config.cache)),
            quota: Arc::new(QuotaTracker::new(config.quota.clone())),
            upstream: UpstreamClient::new(&config.upstream)?,
            inject_prompt: config.anonymize.inject_prompt,
            mapping_ttl: config.store.mapping_ttl,
            max_placeholder_length: config.anonymize.max_placeholder_length,
        })
    }

    /// Test/bespoke constructor wiring explicit parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        anonymizer: Anonymizer,
        deanonymizer: Deanonymizer,
        scanner: Option<SecretScanner>,
        store: Arc<dyn MappingStore>,
        cache: Option<ResponseCache>,
        quota: Arc<QuotaTracker>,
        upstream: UpstreamClient,
        inject_prompt: bool,
        mapping_ttl: Duration,
        max_placeholder_length: usize,
    ) -> Self {
        Self {
            anonymizer,
            deanonymizer,
            scanner,
            store,
            cache,
            quota,
            upstream,
            inject_prompt,
            mapping_ttl,
            max_placeholder_length,
        }
    }

    // -----------------------------------------------------------------
    // Unary path
    // -----------------------------------------------------------------

    /// Process one unary chat completion. Returns the restored upstream
    /// body; an `unresolved` array is added when restoration was partial.
    pub async fn chat_completion(
        &self,
        mut request: ChatRequest,
        tenant: &str,
    ) -> Result<serde_json::Value, ProxyError> {
        self.validate(&request)?;
        self.secret_scan(&mut request.messages, tenant)?;
        let deanonymizer = self.request_deanonymizer(&mut request);

        let mapping = Mapping::new(tenant);
        let sanitized = self.anonymize_messages(&request.messages, &mapping);

        tracing::info!(
            tenant,
            model = %request.model,
            pii_entities = mapping.len(),
            "chat completion",
        );

        let key = cache_key(
            tenant,
            &request.model,
            &sanitized,
            request.temperature,
            request.top_p,
            request.max_tokens,
            &request.extra,
        );

        if let Some(cache) = &self.cache {
            if let Some(mut body) = cache.lookup(&key) {
                let unresolved = restore_body(&deanonymizer, &mut body, &mapping);
                attach_unresolved(&mut body, unresolved);
                tracing::info!(tenant, model = %request.model, "served from cache");
                return Ok(body);
            }
        }

        if let QuotaDecision::Exceeded { kind, period } = self.quota.check_request(tenant) {
            tracing::warn!(tenant, ?kind, ?period, "quota exceeded");
            return Err(ProxyError::QuotaExceeded {
                tenant: tenant.to_string(),
            });
        }

        let mapping_id = mapping.id().to_string();
        self.store
            .put(mapping.to_record(self.mapping_ttl.as_secs()))
            .await
            .map_err(|e| ProxyError::Internal(e.to_string()))?;

        request.messages = self.with_prompt_injection(sanitized, &mapping);
        request.stream = Some(false);
        let body = serde_json::to_value(&request)
            .map_err(|e| ProxyError::Internal(e.to_string()))?;

        let upstream_body = match self.upstream.complete(&body).await {
            Ok(body) => body,
            Err(e) => {
                // No quota consumed on failure; the mapping is released.
                let _ = self.store.delete(&mapping_id).await;
                return Err(ProxyError::Upstream(e));
            }
        };

        if let Some(cache) = &self.cache {
            cache.store(key, upstream_body.clone());
        }

        // The response path reads the mapping back from the store; a TTL
        // that expired during a slow upstream call surfaces here as
        // absent, and the response goes out with placeholders intact.
        let stored = self
            .store
            .get(&mapping_id)
            .await
            .map_err(|e| ProxyError::Internal(e.to_string()))?;

        let mut restored = upstream_body;
        let unresolved = match stored {
            Some(record) => {
                let mapping = record.into_mapping();
                restore_body(&deanonymizer, &mut restored, &mapping)
            }
            None => {
                tracing::warn!(tenant, mapping_id = %mapping_id, "mapping lost before restore");
                restore_body(&deanonymizer, &mut restored, &Mapping::new(tenant))
            }
        };
        let _ = self.store.delete(&mapping_id).await;

        let tokens = restored
            .pointer("/usage/total_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        self.quota.record_success(tenant, tokens);

        attach_unresolved(&mut restored, unresolved);
        Ok(restored)
    }

    // -----------------------------------------------------------------
    // Streaming path
    // -----------------------------------------------------------------

    /// Process a streaming chat completion. Yields SSE `data:` payloads
    /// ready for re-emission, `[DONE]` included. Streaming bypasses the
    /// response cache.
    pub async fn chat_completion_stream(
        &self,
        mut request: ChatRequest,
        tenant: &str,
    ) -> Result<mpsc::Receiver<Result<String, ProxyError>>, ProxyError> {
        self.validate(&request)?;
        self.secret_scan(&mut request.messages, tenant)?;
        // Fuzzy recovery never runs in-stream, but the override fields
        // must still not leak upstream.
        let _ = self.request_deanonymizer(&mut request);

        let mapping = Arc::new(Mapping::new(tenant));
        let sanitized = self.anonymize_messages(&request.messages, &mapping);

        tracing::info!(
            tenant,
            model = %request.model,
            pii_entities = mapping.len(),
            "streaming chat completion",
        );

        if let QuotaDecision::Exceeded { kind, period } = self.quota.check_request(tenant) {
            tracing::warn!(tenant, ?kind, ?period, "quota exceeded");
            return Err(ProxyError::QuotaExceeded {
                tenant: tenant.to_string(),
            });
        }

        let mapping_id = mapping.id().to_string();
        self.store
            .put(mapping.to_record(self.mapping_ttl.as_secs()))
            .await
            .map_err(|e| ProxyError::Internal(e.to_string()))?;

        request.messages = self.with_prompt_injection(sanitized, &mapping);
        request.stream = Some(true);
        let body = serde_json::to_value(&request)
            .map_err(|e| ProxyError::Internal(e.to_string()))?;

        let mut upstream_rx = match self.upstream.complete_stream(&body).await {
            Ok(rx) => rx,
            Err(e) => {
                let _ = self.store.delete(&mapping_id).await;
                return Err(ProxyError::Upstream(e));
            }
        };

        let (tx, rx) = mpsc::channel::<Result<String, ProxyError>>(64);
        let store = self.store.clone();
        let quota = self.quota.clone();
        let quota_tenant = tenant.to_string();
        let max_len = self.max_placeholder_length;

        tokio::spawn(async move {
            let mut buffer = StreamBuffer::new(mapping.clone(), max_len);
            // Metadata from the last chunk, reused when synthesizing the
            // flush chunk at end of stream.
            let mut last_meta: Option<ChatChunk> = None;
            let mut completed = false;

            while let Some(item) = upstream_rx.recv().await {
                match item {
                    Err(e) => {
                        let _ = tx.send(Err(ProxyError::Upstream(e))).await;
                        break;
                    }
                    Ok(payload) if payload == "[DONE]" => {
                        let tail = buffer.flush();
                        if !tail.is_empty() {
                            if let Some(chunk) = synthesized_chunk(&last_meta, tail) {
                                if tx.send(Ok(chunk)).await.is_err() {
                                    break;
                                }
                            }
                        }
                        let _ = tx.send(Ok("[DONE]".to_string())).await;
                        completed = true;
                        break;
                    }
                    Ok(payload) => {
                        let Ok(mut chunk) = serde_json::from_str::<ChatChunk>(&payload) else {
                            // Not a delta chunk; pass through untouched.
                            if tx.send(Ok(payload)).await.is_err() {
                                break;
                            }
                            continue;
                        };

                        let finish = chunk.choices.iter().any(|c| c.finish_reason.is_some());
                        let mut emitted = String::new();
                        if let Some(choice) = chunk.choices.first_mut() {
                            if let Some(content) = choice.delta.content.take() {
                                emitted = buffer.push(&content);
                            }
                            if finish {
                                emitted.push_str(&buffer.flush());
                            }
                            choice.delta.content =
                                (!emitted.is_empty()).then(|| emitted.clone());
                        }

                        let keep = !emitted.is_empty()
                            || finish
                            || chunk.choices.iter().any(|c| c.delta.role.is_some());
                        last_meta = Some(chunk.clone());
                        if keep {
                            match serde_json::to_string(&chunk) {
                                Ok(data) => {
                                    if tx.send(Ok(data)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    let _ = tx
                                        .send(Err(ProxyError::Internal(e.to_string())))
                                        .await;
                                    break;
                                }
                            }
                        }
                    }
                }
            }

            // Mapping release: end of stream, upstream failure, or client
            // disconnect all land here.
            let _ = store.delete(mapping.id()).await;
            if completed {
                quota.record_success(&quota_tenant, 0);
            }
        });

        Ok(rx)
    }

    /// Pass the upstream model list through.
    pub async fn models(&self) -> Result<serde_json::Value, ProxyError> {
        self.upstream.list_models().await.map_err(ProxyError::Upstream)
    }

    // -----------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------

    fn validate(&self, request: &ChatRequest) -> Result<(), ProxyError> {
        if request.model.trim().is_empty() {
            return Err(ProxyError::BadRequest("model must not be empty".to_string()));
        }
        if request.messages.is_empty() {
            return Err(ProxyError::BadRequest(
                "messages must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// SECRET-SCAN stage. Block terminates the request before any mapping
    /// exists; Redact rewrites message contents in place; Warn logs.
    fn secret_scan(
        &self,
        messages: &mut [ChatMessage],
        tenant: &str,
    ) -> Result<(), ProxyError> {
        let Some(scanner) = &self.scanner else {
            return Ok(());
        };

        for message in messages.iter_mut() {
            let Some(content) = message.content.clone() else {
                continue;
            };
            let outcome = scanner.scan(&content);
            match outcome.action {
                ScanAction::Allow => {}
                ScanAction::Warn => {
                    tracing::warn!(
                        tenant,
                        findings = outcome.findings.len(),
                        "secret scanner warning"
                    );
                }
                ScanAction::Redact => {
                    tracing::warn!(
                        tenant,
                        findings = outcome.findings.len(),
                        "secret scanner redacted request content"
                    );
                    message.content = Some(scanner.redact(&content, &outcome.findings));
                }
                ScanAction::Block => {
                    let names: Vec<&str> =
                        outcome.findings.iter().map(|f| f.pattern_name).collect();
                    tracing::warn!(tenant, patterns = ?names, "secret scanner blocked request");
                    return Err(ProxyError::SecretBlocked {
                        reason: format!("detected {}", names.join(", ")),
                    });
                }
            }
        }
        Ok(())
    }

    /// ANONYMIZE stage. System messages carry instructions, not user
    /// data, and pass through untouched.
    fn anonymize_messages(&self, messages: &[ChatMessage], mapping: &Mapping) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|message| {
                if message.is_system() {
                    return message.clone();
                }
                let content = message.content.as_deref().map(|content| {
                    self.anonymizer.anonymize_into(content, None, mapping).text
                });
                ChatMessage {
                    role: message.role.clone(),
                    content,
                    name: message.name.clone(),
                }
            })
            .collect()
    }

    /// Prepend the preservation prompt as a system message when enabled
    /// and at least one placeholder exists. An existing leading system
    /// message is extended instead of duplicated.
    fn with_prompt_injection(
        &self,
        mut messages: Vec<ChatMessage>,
        mapping: &Mapping,
    ) -> Vec<ChatMessage> {
        if !self.inject_prompt || mapping.is_empty() {
            return messages;
        }

        match messages.first_mut() {
            Some(first) if first.is_system() => {
                let existing = first.content.take().unwrap_or_default();
                first.content = Some(format!(
                    "{}\n\n{}",
                    existing, PLACEHOLDER_PRESERVATION_PROMPT
                ));
                messages
            }
            _ => {
                let mut with_prompt =
                    vec![ChatMessage::system(PLACEHOLDER_PRESERVATION_PROMPT)];
                with_prompt.extend(messages);
                with_prompt
            }
        }
    }

    /// Per-request restoration settings: `fuzzy_enabled` and
    /// `fuzzy_confidence_threshold` may be overridden in the request
    /// body. The fields are removed so the upstream never sees them.
    fn request_deanonymizer(&self, request: &mut ChatRequest) -> Deanonymizer {
        let enabled = request
            .extra
            .remove("fuzzy_enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or_else(|| self.deanonymizer.fuzzy_enabled());
        let threshold = request
            .extra
            .remove("fuzzy_confidence_threshold")
            .and_then(|v| v.as_f64())
            .map(|v| v as f32)
            .unwrap_or_else(|| self.deanonymizer.fuzzy_confidence_threshold());
        Deanonymizer::new(enabled, threshold, self.max_placeholder_length)
    }
}

/// RESTORE stage for unary bodies: walk every string field and apply the
/// deanonymizer. Returns placeholders that stayed unresolved.
fn restore_body(
    deanonymizer: &Deanonymizer,
    body: &mut serde_json::Value,
    mapping: &Mapping,
) -> Vec<String> {
    let mut unresolved = Vec::new();
    restore_value(deanonymizer, body, mapping, &mut unresolved);
    unresolved.sort();
    unresolved.dedup();
    unresolved
}

fn restore_value(
    deanonymizer: &Deanonymizer,
    value: &mut serde_json::Value,
    mapping: &Mapping,
    unresolved: &mut Vec<String>,
) {
    match value {
        serde_json::Value::String(s) => {
            let outcome = deanonymizer.restore(s, mapping);
            unresolved.extend(outcome.unresolved);
            *s = outcome.text;
        }
        serde_json::Value::Array(items) => {
            for item in items {
                restore_value(deanonymizer, item, mapping, unresolved);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                restore_value(deanonymizer, item, mapping, unresolved);
            }
        }
        _ => {}
    }
}

fn attach_unresolved(body: &mut serde_json::Value, unresolved: Vec<String>) {
    if unresolved.is_empty() {
        return;
    }
    if let serde_json::Value::Object(map) = body {
        map.insert(
            "unresolved".to_string(),
            serde_json::Value::Array(
                unresolved.into_iter().map(serde_json::Value::String).collect(),
            ),
        );
    }
}

/// Build a content-only chunk reusing the metadata of the last chunk
/// seen, for emitting flushed carry at end of stream.
fn synthesized_chunk(last: &Option<ChatChunk>, content: String) -> Option<String> {
    let meta = last.as_ref()?;
    let chunk = ChatChunk {
        id: meta.id.clone(),
        object: meta.object.clone(),
        created: meta.created,
        model: meta.model.clone(),
        choices: vec![crate::api::types::ChunkChoice {
            index: 0,
            delta: crate::api::types::ChunkDelta {
                role: None,
                content: Some(content),
            },
            finish_reason: None,
        }],
        extra: serde_json::Map::new(),
    };
    serde_json::to_string(&chunk).ok()
}
