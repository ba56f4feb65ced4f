//! Fuzzy placeholder recovery.
//!
//! Upstream models rewrite placeholders in predictable ways: case
//! changes, stray whitespace, different brackets or separators, or the
//! bare token with the angle brackets dropped. Each variant pattern
//! carries a base confidence, reduced per extra character of drift from
//! the canonical token; matches below the configured threshold are
//! ignored. When variant matches overlap, the longest one wins.
//!
//! The bare form scores 0.90, so the default threshold of 0.85 accepts
//! it and raising the threshold past 0.90 turns it off.

use std::sync::LazyLock;

use regex::Regex;

use crate::anonymize::Mapping;

struct VariantPattern {
    regex: &'static LazyLock<Regex>,
    base_confidence: f32,
}

// Case and whitespace drift inside angle brackets.
static ANGLE_LOOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*([A-Za-z][A-Za-z0-9_]*)\s*_\s*([0-9]+)\s*>").expect("hardcoded regex must compile")
});

// Space instead of the underscore separator.
static ANGLE_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*([A-Za-z][A-Za-z0-9_]*)\s+([0-9]+)\s*>").expect("hardcoded regex must compile")
});

static ANGLE_DASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z][A-Za-z0-9_]*)-([0-9]+)>").expect("hardcoded regex must compile")
});

static ANGLE_COLON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z][A-Za-z0-9_]*):([0-9]+)>").expect("hardcoded regex must compile")
});

static ANGLE_HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z][A-Za-z0-9_]*)#([0-9]+)>").expect("hardcoded regex must compile")
});

static DOUBLE_CURLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z][A-Za-z0-9_]*)[_\s]([0-9]+)\s*\}\}")
        .expect("hardcoded regex must compile")
});

static SQUARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*([A-Za-z][A-Za-z0-9_]*)[_\s]([0-9]+)\s*\]")
        .expect("hardcoded regex must compile")
});

static CURLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\s*([A-Za-z][A-Za-z0-9_]*)[_\s]([0-9]+)\s*\}")
        .expect("hardcoded regex must compile")
});

static PAREN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*([A-Za-z][A-Za-z0-9_]*)[_\s]([0-9]+)\s*\)")
        .expect("hardcoded regex must compile")
});

// Bare TYPE_N; the trailing \b demands a word boundary or punctuation.
static BARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z][A-Za-z0-9_]*)_([0-9]+)\b").expect("hardcoded regex must compile")
});

const PATTERNS: &[VariantPattern] = &[
    VariantPattern {
        regex: &ANGLE_LOOSE_RE,
        base_confidence: 0.95,
    },
    VariantPattern {
        regex: &ANGLE_SPACE_RE,
        base_confidence: 0.92,
    },
    VariantPattern {
        regex: &ANGLE_DASH_RE,
        base_confidence: 0.92,
    },
    VariantPattern {
        regex: &ANGLE_COLON_RE,
        base_confidence: 0.92,
    },
    VariantPattern {
        regex: &ANGLE_HASH_RE,
        base_confidence: 0.92,
    },
    VariantPattern {
        regex: &DOUBLE_CURLY_RE,
        base_confidence: 0.92,
    },
    VariantPattern {
        regex: &SQUARE_RE,
        base_confidence: 0.88,
    },
    VariantPattern {
        regex: &CURLY_RE,
        base_confidence: 0.88,
    },
    VariantPattern {
        regex: &PAREN_RE,
        base_confidence: 0.88,
    },
    VariantPattern {
        regex: &BARE_RE,
        base_confidence: 0.90,
    },
];

#[derive(Debug)]
struct VariantMatch {
    start: usize,
    end: usize,
    replacement: String,
}

/// Variant matcher with a confidence floor.
pub struct FuzzyMatcher {
    confidence_threshold: f32,
}

impl FuzzyMatcher {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Replace every confident variant match; returns the rewritten text
    /// and the replacement count.
    pub fn restore(&self, text: &str, mapping: &Mapping) -> (String, usize) {
        let mut matches: Vec<VariantMatch> = Vec::new();

        for pattern in PATTERNS {
            for caps in pattern.regex.captures_iter(text) {
                let whole = caps.get(0).expect("capture group 0 always present");
                let entity_type = caps
                    .get(1)
                    .map(|m| m.as_str().to_uppercase())
                    .unwrap_or_default();
                let index = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

                let normalized = format!("<{}_{}>", entity_type, index);
                let Some(original) = mapping.original_for(&normalized) else {
                    continue;
                };

                let confidence = score(whole.as_str(), &normalized, pattern.base_confidence);
                if confidence < self.confidence_threshold {
                    continue;
                }

                matches.push(VariantMatch {
                    start: whole.start(),
                    end: whole.end(),
                    replacement: original,
                });
            }
        }

        if matches.is_empty() {
            return (text.to_string(), 0);
        }

        // Longest match wins on overlap, earlier start breaks ties.
        matches.sort_by_key(|m| (std::cmp::Reverse(m.end - m.start), m.start));
        let mut accepted: Vec<VariantMatch> = Vec::new();
        for candidate in matches {
            let overlaps = accepted
                .iter()
                .any(|m| candidate.start < m.end && m.start < candidate.end);
            if !overlaps {
                accepted.push(candidate);
            }
        }
        accepted.sort_by_key(|m| m.start);

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0usize;
        let count = accepted.len();
        for m in accepted {
            out.push_str(&text[cursor..m.start]);
            out.push_str(&m.replacement);
            cursor = m.end;
        }
        out.push_str(&text[cursor..]);
        (out, count)
    }
}

/// Confidence for one match: the pattern base minus 0.02 per character of
/// drift beyond the canonical token length, capped at 0.06.
fn score(matched: &str, normalized: &str, base: f32) -> f32 {
    let extra = matched
        .chars()
        .count()
        .saturating_sub(normalized.chars().count());
    (base - (extra as f32 * 0.02).min(0.06)).clamp(0.0, 1.0)
}
