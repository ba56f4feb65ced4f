//! PII detection: spans, the detector seam, and the composing registry.
//!
//! Individual detectors are black boxes behind the [`Detector`] trait.
//! The registry composes them into one canonical, non-overlapping span
//! list. It is stateless across requests; hot-reload replaces the whole
//! registry behind its `Arc`, so in-flight requests keep their snapshot.

pub mod allowlist;
pub mod patterns;
pub mod secrets;

use std::sync::Arc;

pub use allowlist::Allowlist;

/// A single detection result over the input text.
///
/// `start..end` is a half-open byte range on UTF-8 boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpan {
    /// Uppercase entity type, e.g. "PERSON", "EMAIL".
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
    /// Detector confidence in [0, 1].
    pub score: f32,
    /// The matched text.
    pub text: String,
}

impl EntitySpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn overlaps(&self, other: &EntitySpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A PII detector. Implementations must be cheap to call per request.
pub trait Detector: Send + Sync {
    /// Detector name, used in logs.
    fn name(&self) -> &str;

    /// Detect spans in `text`. `language` is a hint detectors may ignore.
    fn detect(&self, text: &str, language: Option<&str>) -> Vec<EntitySpan>;
}

/// Composes registered detectors into one canonical span list.
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
    allowlist: Allowlist,
    score_threshold: f32,
}

impl DetectorRegistry {
    pub fn new(
        detectors: Vec<Arc<dyn Detector>>,
        allowlist: Allowlist,
        score_threshold: f32,
    ) -> Self {
        Self {
            detectors,
            allowlist,
            score_threshold,
        }
    }

    /// Registry with the builtin regex detectors and an empty allowlist.
    pub fn with_builtins(score_threshold: f32) -> Self {
        Self::new(
            patterns::builtin_detectors(),
            Allowlist::default(),
            score_threshold,
        )
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Produce the canonical list of non-overlapping spans, ordered by
    /// start position.
    ///
    /// 1. Run every detector and collect candidates.
    /// 2. Drop allowlisted terms (case-insensitive) and low-score spans.
    /// 3. Sort by (-score, -length, start).
    /// 4. Greedily accept spans that overlap nothing already accepted.
    /// 5. Re-sort accepted spans by start.
    pub fn detect(&self, text: &str, language: Option<&str>) -> Vec<EntitySpan> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<EntitySpan> = Vec::new();
        for detector in &self.detectors {
            let spans = detector.detect(text, language);
            tracing::trace!(detector = detector.name(), count = spans.len(), "detector ran");
            candidates.extend(spans);
        }

        candidates.retain(|span| {
            span.score >= self.score_threshold && !self.allowlist.contains(&span.text)
        });

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.len().cmp(&a.len()))
                .then_with(|| a.start.cmp(&b.start))
        });

        let mut accepted: Vec<EntitySpan> = Vec::new();
        for candidate in candidates {
            if !accepted.iter().any(|span| span.overlaps(&candidate)) {
                accepted.push(candidate);
            }
        }

        accepted.sort_by_key(|span| span.start);
        accepted
    }
}
