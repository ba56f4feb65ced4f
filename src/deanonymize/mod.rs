//! Deanonymization engine.
//!
//! Restores original values in upstream responses. Three passes:
//!
//! 1. **Exact**: scan for grammar placeholders `<TYPE_N>` and look each
//!    one up in the mapping. Tokens are matched whole, so `<PHONE_1>` can
//!    never shadow `<PHONE_10>`.
//! 2. **Literal**: synthetic fakes and hash digests restore by plain
//!    substring replacement, longest token first.
//! 3. **Fuzzy** (optional): recover the variant spellings models produce
//!    instead of the exact token. See [`fuzzy`].

pub mod fuzzy;
pub mod stream;

use std::sync::LazyLock;

use regex::Regex;

pub use stream::StreamBuffer;

use crate::anonymize::Mapping;

/// The exact placeholder grammar: `<TYPE_N>`, TYPE uppercase, N ≥ 1.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Z][A-Z0-9_]*)_([1-9][0-9]*)>").expect("hardcoded regex must compile")
});

/// Whether `token` is, in its entirety, a grammar placeholder.
pub fn is_placeholder(token: &str) -> bool {
    PLACEHOLDER_RE
        .find(token)
        .is_some_and(|m| m.start() == 0 && m.end() == token.len())
}

/// Result of a restore pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreOutcome {
    pub text: String,
    /// Number of tokens replaced across all passes.
    pub replaced: usize,
    /// Grammar placeholders present in the text but absent from the
    /// mapping. Reported for observability; not an error.
    pub unresolved: Vec<String>,
}

impl RestoreOutcome {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Configurable deanonymizer.
#[derive(Debug, Clone)]
pub struct Deanonymizer {
    fuzzy_enabled: bool,
    fuzzy_confidence_threshold: f32,
    max_placeholder_length: usize,
}

impl Default for Deanonymizer {
    fn default() -> Self {
        Self {
            fuzzy_enabled: true,
            fuzzy_confidence_threshold: 0.85,
            max_placeholder_length: 25,
        }
    }
}

impl Deanonymizer {
    pub fn new(
        fuzzy_enabled: bool,
        fuzzy_confidence_threshold: f32,
        max_placeholder_length: usize,
    ) -> Self {
        Self {
            fuzzy_enabled,
            fuzzy_confidence_threshold,
            max_placeholder_length,
        }
    }

    pub fn max_placeholder_length(&self) -> usize {
        self.max_placeholder_length
    }

    pub fn fuzzy_enabled(&self) -> bool {
        self.fuzzy_enabled
    }

    pub fn fuzzy_confidence_threshold(&self) -> f32 {
        self.fuzzy_confidence_threshold
    }

    /// Restore `text` using `mapping`: exact, then literal, then fuzzy.
    pub fn restore(&self, text: &str, mapping: &Mapping) -> RestoreOutcome {
        if text.is_empty() {
            return RestoreOutcome {
                text: String::new(),
                replaced: 0,
                unresolved: Vec::new(),
            };
        }

        let mut outcome = exact_restore(text, mapping, self.max_placeholder_length);

        let (text, literal_count) = literal_restore(&outcome.text, mapping);
        outcome.text = text;
        outcome.replaced += literal_count;

        if self.fuzzy_enabled {
            let matcher = fuzzy::FuzzyMatcher::new(self.fuzzy_confidence_threshold);
            let (text, fuzzy_count) = matcher.restore(&outcome.text, mapping);
            outcome.text = text;
            outcome.replaced += fuzzy_count;
        }

        outcome
    }
}

/// Exact pass: replace every in-grammar placeholder the mapping knows,
/// recording the ones it does not. Tokens longer than
/// `max_placeholder_length` fail the grammar and pass through untouched.
pub(crate) fn exact_restore(
    text: &str,
    mapping: &Mapping,
    max_placeholder_length: usize,
) -> RestoreOutcome {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    let mut replaced = 0usize;
    let mut unresolved = Vec::new();

    for m in PLACEHOLDER_RE.find_iter(text) {
        out.push_str(&text[cursor..m.start()]);
        let token = m.as_str();
        if token.chars().count() > max_placeholder_length {
            out.push_str(token);
        } else if let Some(original) = mapping.original_for(token) {
            out.push_str(&original);
            replaced += 1;
        } else {
            unresolved.push(token.to_string());
            out.push_str(token);
        }
        cursor = m.end();
    }
    out.push_str(&text[cursor..]);

    RestoreOutcome {
        text: out,
        replaced,
        unresolved,
    }
}

/// Literal pass: synthetic fakes and hash digests, longest first so one
/// token can never clip a longer one that contains it.
fn literal_restore(text: &str, mapping: &Mapping) -> (String, usize) {
    let mut entries = mapping.literal_entries();
    if entries.is_empty() {
        return (text.to_string(), 0);
    }
    entries.sort_by_key(|(token, _)| std::cmp::Reverse(token.len()));

    let mut result = text.to_string();
    let mut replaced = 0usize;
    for (token, original) in entries {
        if result.contains(&token) {
            replaced += result.matches(&token).count();
            result = result.replace(&token, &original);
        }
    }
    (result, replaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymize::Strategy;

    fn mapping_with(entries: &[(&str, &str, &str)]) -> Mapping {
        let mapping = Mapping::new("default");
        for (entity_type, original, _expected) in entries {
            Strategy::Placeholder.apply(original, entity_type, &mapping);
        }
        mapping
    }

    #[test]
    fn exact_tokens_restore() {
        let mapping = mapping_with(&[("PERSON", "Alice", "<PERSON_1>")]);
        let outcome = Deanonymizer::default().restore("Hello <PERSON_1>!", &mapping);
        assert_eq!(outcome.text, "Hello Alice!");
        assert_eq!(outcome.replaced, 1);
        assert!(outcome.is_complete());
    }

    #[test]
    fn longer_index_is_not_shadowed_by_shorter() {
        let mapping = Mapping::new("default");
        for i in 0..10 {
            Strategy::Placeholder.apply(&format!("p{}", i), "PHONE", &mapping);
        }
        let outcome = Deanonymizer::default().restore("<PHONE_10> vs <PHONE_1>", &mapping);
        assert_eq!(outcome.text, "p9 vs p0");
    }

    #[test]
    fn unknown_placeholder_is_reported_not_replaced() {
        let mapping = mapping_with(&[("PERSON", "Alice", "<PERSON_1>")]);
        let outcome = Deanonymizer::default().restore("<PERSON_1> and <PERSON_7>", &mapping);
        assert_eq!(outcome.text, "Alice and <PERSON_7>");
        assert_eq!(outcome.unresolved, vec!["<PERSON_7>".to_string()]);
        assert!(!outcome.is_complete());
    }

    #[test]
    fn restoration_is_order_insensitive() {
        // Build the same mapping with two different insertion orders.
        let forward = Mapping::new("default");
        Strategy::Placeholder.apply("Alice", "PERSON", &forward);
        Strategy::Placeholder.apply("a@b.com", "EMAIL", &forward);

        let text = "<EMAIL_1> belongs to <PERSON_1>";
        let outcome = Deanonymizer::default().restore(text, &forward);
        assert_eq!(outcome.text, "a@b.com belongs to Alice");
    }

    #[test]
    fn non_grammar_angle_tokens_pass_through() {
        let mapping = mapping_with(&[("PERSON", "Alice", "<PERSON_1>")]);
        let outcome = Deanonymizer::default().restore("<tag> <PERSON_0> <P1>", &mapping);
        assert_eq!(outcome.text, "<tag> <PERSON_0> <P1>");
        assert!(outcome.unresolved.is_empty());
    }

    #[test]
    fn overlong_tokens_fail_the_grammar() {
        let mapping = Mapping::new("default");
        Strategy::Placeholder.apply("x", "A_VERY_LONG_ENTITY_TYPE_NAME", &mapping);
        let token = "<A_VERY_LONG_ENTITY_TYPE_NAME_1>";
        let deanonymizer = Deanonymizer::new(false, 0.85, 25);
        let outcome = deanonymizer.restore(token, &mapping);
        assert_eq!(outcome.text, token);
    }

    #[test]
    fn synthetic_fakes_restore_via_literal_pass() {
        let mapping = Mapping::new("default");
        let fake = Strategy::Synthetic.apply("Alice", "PERSON", &mapping);
        let text = format!("Tell {} the meeting moved", fake);
        let outcome = Deanonymizer::default().restore(&text, &mapping);
        assert_eq!(outcome.text, "Tell Alice the meeting moved");
        assert_eq!(outcome.replaced, 1);
    }

    #[test]
    fn hash_digests_restore_via_shadow_index() {
        let mapping = Mapping::new("default");
        let digest = Strategy::Hash.apply("4111111111111111", "CREDIT_CARD", &mapping);
        let text = format!("card {} was charged", digest);
        let outcome = Deanonymizer::default().restore(&text, &mapping);
        assert_eq!(outcome.text, "card 4111111111111111 was charged");
    }

    #[test]
    fn is_placeholder_matches_whole_tokens_only() {
        assert!(is_placeholder("<PERSON_1>"));
        assert!(is_placeholder("<CREDIT_CARD_12>"));
        assert!(!is_placeholder("<person_1>"));
        assert!(!is_placeholder("<PERSON_0>"));
        assert!(!is_placeholder("x<PERSON_1>"));
        assert!(!is_placeholder("<PERSON_1>."));
    }
}
