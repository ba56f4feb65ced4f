//! Anonymization strategies.
//!
//! Five strategies share one contract: given the original value, its
//! entity type and the request's mapping, produce the wire-level
//! replacement. Reversible strategies (placeholder, synthetic, hash)
//! record themselves in the mapping; mask and redact do not.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::anonymize::{synthetic, Mapping};
use crate::config::CompliancePreset;

/// How a detected value is rewritten on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// `<TYPE_N>` token. The default.
    #[default]
    Placeholder,
    /// Realistic fake of the same type; recorded like a placeholder.
    Synthetic,
    /// Hex digest of `entity_type:original`; reversible via the shadow index.
    Hash,
    /// Format-preserving partial reveal. Not reversible.
    Mask,
    /// Fixed `[REDACTED]` token. Not reversible.
    Redact,
}

impl Strategy {
    /// Whether this strategy records an entry the deanonymizer can undo.
    pub fn is_reversible(self) -> bool {
        matches!(self, Strategy::Placeholder | Strategy::Synthetic | Strategy::Hash)
    }

    /// Produce the wire replacement for `original`.
    ///
    /// Two occurrences of the same `(entity_type, original)` within one
    /// mapping always yield the same replacement: the mapping's
    /// get-or-assign collapses repeats, and the hash digest is a pure
    /// function of its input.
    pub fn apply(self, original: &str, entity_type: &str, mapping: &Mapping) -> String {
        let normalized = normalize_value(original, entity_type);
        match self {
            Strategy::Placeholder => mapping.get_or_assign(entity_type, original, &normalized, |n| {
                format!("<{}_{}>", entity_type, n)
            }),
            Strategy::Synthetic => mapping.get_or_assign(entity_type, original, &normalized, |n| {
                synthetic::generate(entity_type, n)
            }),
            Strategy::Hash => {
                let digest = hash_digest(entity_type, original);
                mapping.insert_hash(&digest, original, entity_type);
                digest
            }
            Strategy::Mask => mask_value(original, entity_type),
            Strategy::Redact => "[REDACTED]".to_string(),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "synthetic" => Ok(Self::Synthetic),
            "hash" => Ok(Self::Hash),
            "mask" => Ok(Self::Mask),
            "redact" => Ok(Self::Redact),
            _ => Err(format!("unknown strategy '{}'", s)),
        }
    }
}

/// Per-entity-type strategy dispatch table.
#[derive(Debug, Clone)]
pub struct StrategyTable {
    per_type: HashMap<String, Strategy>,
    default: Strategy,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self::for_preset(CompliancePreset::Balanced)
    }
}

impl StrategyTable {
    /// Defaults for a compliance preset.
    ///
    /// Identifier-shaped PII (cards, ids) is masked or redacted because a
    /// placeholder leaks less useful context to the model than a partial
    /// reveal preserves for the caller.
    pub fn for_preset(preset: CompliancePreset) -> Self {
        let mut per_type = HashMap::new();
        match preset {
            CompliancePreset::Strict => {
                per_type.insert("CREDIT_CARD".to_string(), Strategy::Redact);
                per_type.insert("ID_CARD".to_string(), Strategy::Redact);
                per_type.insert("SSN".to_string(), Strategy::Redact);
                per_type.insert("IP".to_string(), Strategy::Mask);
            }
            CompliancePreset::Balanced => {
                per_type.insert("CREDIT_CARD".to_string(), Strategy::Mask);
                per_type.insert("ID_CARD".to_string(), Strategy::Mask);
                per_type.insert("SSN".to_string(), Strategy::Mask);
                per_type.insert("IP".to_string(), Strategy::Mask);
            }
            CompliancePreset::Permissive => {}
        }
        Self {
            per_type,
            default: Strategy::Placeholder,
        }
    }

    /// Override the strategy for one entity type.
    pub fn set(&mut self, entity_type: &str, strategy: Strategy) {
        self.per_type.insert(entity_type.to_uppercase(), strategy);
    }

    pub fn strategy_for(&self, entity_type: &str) -> Strategy {
        self.per_type.get(entity_type).copied().unwrap_or(self.default)
    }
}

fn hash_digest(entity_type: &str, original: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entity_type.as_bytes());
    hasher.update(b":");
    hasher.update(original.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Normalize a value for repeat collapse: strip separators from numeric
/// identifiers, lowercase emails. `138-0013-8000` and `13800138000` must
/// land on the same placeholder.
pub fn normalize_value(value: &str, entity_type: &str) -> String {
    let stripped: String = value.split_whitespace().collect();
    match entity_type {
        "PHONE" | "CREDIT_CARD" | "ID_CARD" | "SSN" => stripped
            .chars()
            .filter(|c| !matches!(c, '-' | '(' | ')' | '.'))
            .collect(),
        "EMAIL" => stripped.to_lowercase(),
        _ => stripped,
    }
}

/// Format-preserving partial reveal.
fn mask_value(value: &str, entity_type: &str) -> String {
    match entity_type {
        "PHONE" => mask_digits(value, 3, 4),
        "CREDIT_CARD" => mask_digits(value, 4, 4),
        "ID_CARD" => mask_digits(value, 6, 4),
        "SSN" => mask_digits(value, 0, 4),
        "EMAIL" => mask_email(value),
        _ => mask_generic(value),
    }
}

fn mask_digits(value: &str, head: usize, tail: usize) -> String {
    let digits: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || c.eq_ignore_ascii_case(&'x'))
        .collect();
    if digits.len() <= head + tail {
        return "*".repeat(value.chars().count());
    }
    format!(
        "{}{}{}",
        &digits[..head],
        "*".repeat(digits.len() - head - tail),
        &digits[digits.len() - tail..]
    )
}

fn mask_email(value: &str) -> String {
    let Some((local, domain)) = value.split_once('@') else {
        return "*".repeat(value.chars().count());
    };
    let local_len = local.chars().count();
    let masked_local = if local_len <= 2 {
        "*".repeat(local_len)
    } else {
        let first = local.chars().next().unwrap_or('*');
        let last = local.chars().last().unwrap_or('*');
        format!("{}{}{}", first, "*".repeat(local_len - 2), last)
    };
    format!("{}@{}", masked_local, domain)
}

fn mask_generic(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let show = (chars.len() / 4).max(1);
    let head: String = chars[..show].iter().collect();
    let tail: String = chars[chars.len() - show..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 2 * show), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_strategy_numbers_per_type() {
        let mapping = Mapping::new("default");
        assert_eq!(
            Strategy::Placeholder.apply("Alice", "PERSON", &mapping),
            "<PERSON_1>"
        );
        assert_eq!(
            Strategy::Placeholder.apply("Bob", "PERSON", &mapping),
            "<PERSON_2>"
        );
        assert_eq!(
            Strategy::Placeholder.apply("Alice", "PERSON", &mapping),
            "<PERSON_1>"
        );
    }

    #[test]
    fn synthetic_strategy_is_stable_within_a_mapping() {
        let mapping = Mapping::new("default");
        let a = Strategy::Synthetic.apply("Alice", "PERSON", &mapping);
        let b = Strategy::Synthetic.apply("Alice", "PERSON", &mapping);
        assert_eq!(a, b);
        assert_ne!(a, "Alice");
        assert_eq!(mapping.original_for(&a).unwrap(), "Alice");
    }

    #[test]
    fn hash_strategy_is_deterministic_and_recorded() {
        let mapping = Mapping::new("default");
        let a = Strategy::Hash.apply("4111111111111111", "CREDIT_CARD", &mapping);
        let b = Strategy::Hash.apply("4111111111111111", "CREDIT_CARD", &mapping);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(mapping.original_for_digest(&a).unwrap(), "4111111111111111");
    }

    #[test]
    fn mask_and_redact_do_not_touch_the_mapping() {
        let mapping = Mapping::new("default");
        let masked = Strategy::Mask.apply("13800138000", "PHONE", &mapping);
        let redacted = Strategy::Redact.apply("x@y.com", "EMAIL", &mapping);
        assert_eq!(masked, "138****8000");
        assert_eq!(redacted, "[REDACTED]");
        assert!(mapping.is_empty());
        assert!(mapping.literal_entries().is_empty());
    }

    #[test]
    fn mask_shapes_per_type() {
        let mapping = Mapping::new("default");
        assert_eq!(
            Strategy::Mask.apply("4111 1111 1111 1111", "CREDIT_CARD", &mapping),
            "4111********1111"
        );
        assert_eq!(
            Strategy::Mask.apply("test@example.com", "EMAIL", &mapping),
            "t**t@example.com"
        );
        assert_eq!(Strategy::Mask.apply("123-45-6789", "SSN", &mapping), "*****6789");
    }

    #[test]
    fn normalization_collapses_formatting_variants() {
        assert_eq!(
            normalize_value("138-0013-8000", "PHONE"),
            normalize_value("138 0013 8000", "PHONE")
        );
        assert_eq!(
            normalize_value("John@Example.COM", "EMAIL"),
            "john@example.com"
        );
    }

    #[test]
    fn preset_tables_differ_on_identifier_types() {
        let strict = StrategyTable::for_preset(CompliancePreset::Strict);
        let balanced = StrategyTable::for_preset(CompliancePreset::Balanced);
        assert_eq!(strict.strategy_for("CREDIT_CARD"), Strategy::Redact);
        assert_eq!(balanced.strategy_for("CREDIT_CARD"), Strategy::Mask);
        assert_eq!(balanced.strategy_for("PERSON"), Strategy::Placeholder);
    }

    #[test]
    fn strategy_parses_from_str() {
        assert_eq!("mask".parse::<Strategy>().unwrap(), Strategy::Mask);
        assert!("bogus".parse::<Strategy>().is_err());
    }
}
