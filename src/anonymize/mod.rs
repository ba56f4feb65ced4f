//! Anonymization engine.
//!
//! Orchestrates detection, strategy dispatch, numbering and mapping
//! recording, then rebuilds the text with replacements spliced in:
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                   Anonymizer                       │
//! │  text ──► registry.detect() ──► spans              │
//! │  per span: strategy.apply() ──► replacement        │
//! │            reversible? ──► mapping + counter       │
//! │  rebuild: slice ∥ replacement ∥ slice ∥ …          │
//! └────────────────────────────────────────────────────┘
//! ```

pub mod counter;
pub mod mapping;
pub mod strategy;
pub mod synthetic;

use std::sync::Arc;

pub use counter::PlaceholderCounter;
pub use mapping::{Mapping, MappingEntry, MappingRecord};
pub use strategy::{Strategy, StrategyTable};

use crate::detect::DetectorRegistry;

/// Result of anonymizing one piece of text.
#[derive(Debug)]
pub struct AnonymizedText {
    pub text: String,
    /// Number of spans rewritten.
    pub span_count: usize,
}

impl AnonymizedText {
    pub fn has_pii(&self) -> bool {
        self.span_count > 0
    }
}

/// The anonymization engine. Stateless across requests; all per-request
/// state lives in the caller's [`Mapping`].
pub struct Anonymizer {
    registry: Arc<DetectorRegistry>,
    strategies: StrategyTable,
}

impl Anonymizer {
    pub fn new(registry: Arc<DetectorRegistry>, strategies: StrategyTable) -> Self {
        Self { registry, strategies }
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    /// Anonymize `text`, recording reversible replacements into `mapping`.
    ///
    /// Spans arrive ordered and non-overlapping from the registry, so the
    /// output interleaves untouched slices with replacement tokens.
    /// Positions are never reused after a splice because replacement
    /// length generally differs from the original.
    pub fn anonymize_into(
        &self,
        text: &str,
        language: Option<&str>,
        mapping: &Mapping,
    ) -> AnonymizedText {
        let spans = self.registry.detect(text, language);
        if spans.is_empty() {
            return AnonymizedText {
                text: text.to_string(),
                span_count: 0,
            };
        }

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for span in &spans {
            out.push_str(&text[cursor..span.start]);
            let strategy = self.strategies.strategy_for(&span.entity_type);
            let replacement = strategy.apply(&span.text, &span.entity_type, mapping);
            out.push_str(&replacement);
            cursor = span.end;
        }
        out.push_str(&text[cursor..]);

        AnonymizedText {
            text: out,
            span_count: spans.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Allowlist, Detector, EntitySpan};

    /// Finds every occurrence of a fixed needle. Standing in for the
    /// external NLP name detector.
    struct NeedleDetector {
        needle: &'static str,
        entity_type: &'static str,
    }

    impl Detector for NeedleDetector {
        fn name(&self) -> &str {
            "needle"
        }

        fn detect(&self, text: &str, _language: Option<&str>) -> Vec<EntitySpan> {
            let mut spans = Vec::new();
            let mut from = 0;
            while let Some(pos) = text[from..].find(self.needle) {
                let start = from + pos;
                spans.push(EntitySpan {
                    entity_type: self.entity_type.to_string(),
                    start,
                    end: start + self.needle.len(),
                    score: 0.85,
                    text: self.needle.to_string(),
                });
                from = start + self.needle.len();
            }
            spans
        }
    }

    fn engine_with(detectors: Vec<Arc<dyn Detector>>) -> Anonymizer {
        Anonymizer::new(
            Arc::new(DetectorRegistry::new(detectors, Allowlist::default(), 0.5)),
            StrategyTable::default(),
        )
    }

    fn person_and_email_engine() -> Anonymizer {
        engine_with(vec![
            Arc::new(NeedleDetector {
                needle: "John",
                entity_type: "PERSON",
            }),
            Arc::new(crate::detect::patterns::RegexDetector::email()),
        ])
    }

    #[test]
    fn rewrites_person_and_email() {
        let engine = person_and_email_engine();
        let mapping = Mapping::new("default");
        let result = engine.anonymize_into("Email John at john@example.com", None, &mapping);
        assert_eq!(result.text, "Email <PERSON_1> at <EMAIL_1>");
        assert_eq!(result.span_count, 2);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.original_for("<PERSON_1>").unwrap(), "John");
        assert_eq!(mapping.original_for("<EMAIL_1>").unwrap(), "john@example.com");
    }

    #[test]
    fn repeated_value_collapses_to_one_placeholder() {
        let engine = engine_with(vec![Arc::new(NeedleDetector {
            needle: "Alice",
            entity_type: "PERSON",
        })]);
        let mapping = Mapping::new("default");
        let result = engine.anonymize_into("Alice called Alice", None, &mapping);
        assert_eq!(result.text, "<PERSON_1> called <PERSON_1>");
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn no_pii_leaves_text_untouched() {
        let engine = person_and_email_engine();
        let mapping = Mapping::new("default");
        let result = engine.anonymize_into("nothing sensitive here", None, &mapping);
        assert_eq!(result.text, "nothing sensitive here");
        assert!(!result.has_pii());
        assert!(mapping.is_empty());
    }

    #[test]
    fn anonymized_output_is_a_fixed_point() {
        // Detectors find no PII inside placeholder tokens, so a second
        // pass over the output changes nothing.
        let engine = person_and_email_engine();
        let mapping = Mapping::new("default");
        let first = engine.anonymize_into("Email John at john@example.com", None, &mapping);

        let second_mapping = Mapping::new("default");
        let second = engine.anonymize_into(&first.text, None, &second_mapping);
        assert_eq!(second.text, first.text);
        assert!(second_mapping.is_empty());
    }

    #[test]
    fn multibyte_text_around_spans_is_preserved() {
        let engine = engine_with(vec![Arc::new(crate::detect::patterns::RegexDetector::email())]);
        let mapping = Mapping::new("default");
        let result = engine.anonymize_into("联系 john@example.com 谢谢", None, &mapping);
        assert_eq!(result.text, "联系 <EMAIL_1> 谢谢");
    }
}
