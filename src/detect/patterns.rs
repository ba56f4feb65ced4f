//! Builtin regex detectors.
//!
//! These cover the common machine-recognizable PII shapes: email, phone,
//! credit card, IPv4, SSN and national id numbers, plus caller-supplied
//! custom patterns. Name detection is deliberately absent here; an NLP
//! detector plugs in behind the same [`Detector`] seam.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::detect::{Detector, EntitySpan};
use crate::error::DetectError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
        .expect("hardcoded regex must compile")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // International and US shapes; separators allowed between groups.
    // The word boundary lives inside the alternation because `(` sits on
    // a non-word edge where `\b` cannot anchor.
    Regex::new(
        r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)[\s.-]?|\b\d{3}[\s.-]?)\d{3,4}[\s.-]?\d{4}\b",
    )
    .expect("hardcoded regex must compile")
});

static CREDIT_CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b")
        .expect("hardcoded regex must compile")
});

static IPV4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b")
        .expect("hardcoded regex must compile")
});

static SSN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("hardcoded regex must compile"));

static ID_CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    // 18-digit national id, last position may be a checksum letter.
    Regex::new(r"\b\d{17}[\dXx]\b").expect("hardcoded regex must compile")
});

/// All builtin detectors, ready for registry composition.
pub fn builtin_detectors() -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(RegexDetector::email()),
        Arc::new(RegexDetector::phone()),
        Arc::new(RegexDetector::credit_card()),
        Arc::new(RegexDetector::ipv4()),
        Arc::new(RegexDetector::ssn()),
        Arc::new(RegexDetector::id_card()),
    ]
}

/// A single-pattern regex detector.
pub struct RegexDetector {
    name: String,
    entity_type: String,
    pattern: Regex,
    score: f32,
    /// Post-match validator, e.g. a Luhn check for card numbers.
    validate: Option<fn(&str) -> bool>,
}

impl RegexDetector {
    pub fn email() -> Self {
        Self {
            name: "email".to_string(),
            entity_type: "EMAIL".to_string(),
            pattern: EMAIL_RE.clone(),
            score: 0.95,
            validate: None,
        }
    }

    pub fn phone() -> Self {
        Self {
            name: "phone".to_string(),
            entity_type: "PHONE".to_string(),
            pattern: PHONE_RE.clone(),
            score: 0.7,
            validate: None,
        }
    }

    pub fn credit_card() -> Self {
        Self {
            name: "credit_card".to_string(),
            entity_type: "CREDIT_CARD".to_string(),
            pattern: CREDIT_CARD_RE.clone(),
            score: 0.9,
            validate: Some(luhn_valid),
        }
    }

    pub fn ipv4() -> Self {
        Self {
            name: "ipv4".to_string(),
            entity_type: "IP".to_string(),
            pattern: IPV4_RE.clone(),
            score: 0.9,
            validate: None,
        }
    }

    pub fn ssn() -> Self {
        Self {
            name: "ssn".to_string(),
            entity_type: "SSN".to_string(),
            pattern: SSN_RE.clone(),
            score: 0.85,
            validate: None,
        }
    }

    pub fn id_card() -> Self {
        Self {
            name: "id_card".to_string(),
            entity_type: "ID_CARD".to_string(),
            pattern: ID_CARD_RE.clone(),
            score: 0.85,
            validate: None,
        }
    }

    /// Build a custom detector from a caller-supplied pattern.
    pub fn custom(name: &str, entity_type: &str, pattern: &str, score: f32) -> Result<Self, DetectError> {
        let pattern = Regex::new(pattern).map_err(|e| DetectError::InvalidPattern {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            entity_type: entity_type.to_uppercase(),
            pattern,
            score,
            validate: None,
        })
    }
}

impl Detector for RegexDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, text: &str, _language: Option<&str>) -> Vec<EntitySpan> {
        self.pattern
            .find_iter(text)
            .filter(|m| self.validate.map_or(true, |check| check(m.as_str())))
            .map(|m| EntitySpan {
                entity_type: self.entity_type.clone(),
                start: m.start(),
                end: m.end(),
                score: self.score,
                text: m.as_str().to_string(),
            })
            .collect()
    }
}

/// Load custom detectors from a file with one `NAME<TAB>REGEX` line each.
/// Blank lines and `#` comments are skipped.
pub fn load_custom_detectors(path: &Path) -> Result<Vec<Arc<dyn Detector>>, DetectError> {
    let content = std::fs::read_to_string(path).map_err(|e| DetectError::InvalidPattern {
        name: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut detectors: Vec<Arc<dyn Detector>> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, pattern)) = line.split_once('\t') else {
            return Err(DetectError::InvalidPattern {
                name: line.to_string(),
                reason: "expected NAME<TAB>REGEX".to_string(),
            });
        };
        detectors.push(Arc::new(RegexDetector::custom(name, name, pattern, 0.8)?));
    }
    Ok(detectors)
}

/// Luhn checksum over the digits of `value`; separators are ignored.
fn luhn_valid(value: &str) -> bool {
    let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 12 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_email() {
        let detector = RegexDetector::email();
        let spans = detector.detect("write to john@example.com today", None);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "john@example.com");
        assert_eq!(spans[0].entity_type, "EMAIL");
    }

    #[test]
    fn detects_phone_variants() {
        let detector = RegexDetector::phone();
        assert_eq!(detector.detect("call (555) 867-5309 now", None).len(), 1);
        assert_eq!(detector.detect("call 13800138000 now", None).len(), 1);
    }

    #[test]
    fn credit_card_requires_luhn() {
        let detector = RegexDetector::credit_card();
        // 4111111111111111 passes Luhn, 4111111111111112 does not.
        assert_eq!(detector.detect("4111 1111 1111 1111", None).len(), 1);
        assert!(detector.detect("4111 1111 1111 1112", None).is_empty());
    }

    #[test]
    fn detects_ipv4_but_not_versions() {
        let detector = RegexDetector::ipv4();
        assert_eq!(detector.detect("server at 10.0.0.1", None).len(), 1);
        assert!(detector.detect("version 1.2.3", None).is_empty());
    }

    #[test]
    fn luhn_rejects_short_inputs() {
        assert!(!luhn_valid("1234"));
    }

    #[test]
    fn custom_pattern_rejects_bad_regex() {
        assert!(RegexDetector::custom("broken", "BROKEN", "(unclosed", 0.8).is_err());
    }

    #[test]
    fn custom_pattern_uppercases_entity_type() {
        let detector = RegexDetector::custom("emp", "employee_id", r"EMP-\d{4}", 0.8).unwrap();
        let spans = detector.detect("badge EMP-1234", None);
        assert_eq!(spans[0].entity_type, "EMPLOYEE_ID");
    }
}
