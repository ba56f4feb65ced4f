//! Round-trip properties of the anonymize/deanonymize pair.

use std::sync::Arc;

use veilgate::anonymize::{Anonymizer, Mapping, Strategy, StrategyTable};
use veilgate::deanonymize::Deanonymizer;
use veilgate::detect::patterns::RegexDetector;
use veilgate::detect::{Allowlist, Detector, DetectorRegistry};

fn detectors() -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(RegexDetector::email()),
        Arc::new(RegexDetector::phone()),
        Arc::new(
            RegexDetector::custom("person", "PERSON", r"\b(Alice|Bob|John|Carol)\b", 0.85)
                .expect("pattern"),
        ),
    ]
}

fn engine() -> Anonymizer {
    Anonymizer::new(
        Arc::new(DetectorRegistry::new(detectors(), Allowlist::default(), 0.5)),
        StrategyTable::default(),
    )
}

fn deanonymizer() -> Deanonymizer {
    Deanonymizer::new(true, 0.85, 25)
}

#[test]
fn anonymize_then_restore_is_identity() {
    let inputs = [
        "Email John at john@example.com",
        "Alice called Bob, then Alice called Carol.",
        "Reach me at 555-867-5309 or carol@example.org, thanks!",
        "No sensitive content at all.",
        "John <john@example.com> wrote: call John",
    ];

    for input in inputs {
        let mapping = Mapping::new("default");
        let sanitized = engine().anonymize_into(input, None, &mapping);
        let restored = deanonymizer().restore(&sanitized.text, &mapping);
        assert_eq!(restored.text, input, "input: {input}");
        assert!(restored.is_complete(), "input: {input}");
    }
}

#[test]
fn anonymized_text_is_a_fixed_point_of_anonymization() {
    let mapping = Mapping::new("default");
    let first = engine().anonymize_into("Email John at john@example.com", None, &mapping);

    let second_mapping = Mapping::new("default");
    let second = engine().anonymize_into(&first.text, None, &second_mapping);

    assert_eq!(second.text, first.text);
    assert!(second_mapping.is_empty());
}

#[test]
fn distinct_originals_never_share_a_placeholder() {
    let mapping = Mapping::new("default");
    let engine = engine();
    engine.anonymize_into(
        "Alice and Bob and Carol wrote to john@example.com and carol@example.org",
        None,
        &mapping,
    );

    let tokens = mapping.tokens();
    let mut seen = std::collections::HashSet::new();
    for token in &tokens {
        assert!(seen.insert(token.clone()), "token reused: {token}");
    }

    // And no original appears under two tokens.
    let mut originals = std::collections::HashSet::new();
    for token in &tokens {
        let original = mapping.original_for(token).expect("reverse entry");
        assert!(originals.insert(original.clone()), "original duplicated: {original}");
    }
}

#[test]
fn repeated_value_collapses_and_restores() {
    let mapping = Mapping::new("default");
    let sanitized = engine().anonymize_into("Alice called Alice", None, &mapping);
    assert_eq!(sanitized.text, "<PERSON_1> called <PERSON_1>");
    assert_eq!(mapping.len(), 1);

    let restored = deanonymizer().restore(&sanitized.text, &mapping);
    assert_eq!(restored.text, "Alice called Alice");
}

#[test]
fn restoration_is_insensitive_to_entry_order() {
    // The same set of entries, reached by two different construction
    // paths (live inserts vs. a persisted record, whose map re-orders
    // keys), restores identically.
    let text = "<PERSON_2> emailed <EMAIL_1> about <PERSON_1>";

    let live = Mapping::new("default");
    Strategy::Placeholder.apply("Alice", "PERSON", &live);
    Strategy::Placeholder.apply("Bob", "PERSON", &live);
    Strategy::Placeholder.apply("a@b.com", "EMAIL", &live);

    let reloaded = live.to_record(300).into_mapping();

    let a = deanonymizer().restore(text, &live).text;
    let b = deanonymizer().restore(text, &reloaded).text;
    assert_eq!(a, b);
    assert_eq!(a, "Bob emailed a@b.com about Alice");
}

#[test]
fn dense_numbering_per_entity_type() {
    let mapping = Mapping::new("default");
    engine().anonymize_into(
        "Alice, Bob and Carol met. Email: a@x.com, b@x.com, c@x.com",
        None,
        &mapping,
    );

    for token in ["<PERSON_1>", "<PERSON_2>", "<PERSON_3>", "<EMAIL_1>", "<EMAIL_2>", "<EMAIL_3>"] {
        assert!(
            mapping.original_for(token).is_some(),
            "expected dense token {token}"
        );
    }
    assert!(mapping.original_for("<PERSON_4>").is_none());
}

#[test]
fn fuzzy_variants_all_restore_to_the_original() {
    let mapping = Mapping::new("default");
    Strategy::Placeholder.apply("Alice", "PERSON", &mapping);

    let variants = [
        "<person_1>",
        "<Person_1>",
        "< PERSON_1 >",
        "<PERSON _1>",
        "[PERSON_1]",
        "{PERSON_1}",
        "(PERSON_1)",
        "{{PERSON_1}}",
        "<PERSON-1>",
        "<PERSON 1>",
        "<PERSON:1>",
        "<PERSON#1>",
        "PERSON_1",
        "<PERSON_1>.",
        "<PERSON_1>,",
    ];

    let deanonymizer = deanonymizer();
    for variant in variants {
        let text = format!("See {} here", variant);
        let restored = deanonymizer.restore(&text, &mapping);
        assert!(
            restored.text.contains("Alice"),
            "variant {variant:?} gave {:?}",
            restored.text
        );
    }
}

#[test]
fn mask_and_redact_are_not_restored() {
    use veilgate::config::CompliancePreset;

    let registry = Arc::new(DetectorRegistry::new(detectors(), Allowlist::default(), 0.5));
    let mut table = StrategyTable::for_preset(CompliancePreset::Balanced);
    table.set("PHONE", Strategy::Mask);
    let engine = Anonymizer::new(registry, table);

    let mapping = Mapping::new("default");
    let sanitized = engine.anonymize_into("call 555-867-5309 now", None, &mapping);
    assert!(sanitized.text.contains('*'));
    assert!(mapping.is_empty());

    let restored = deanonymizer().restore(&sanitized.text, &mapping);
    assert_eq!(restored.text, sanitized.text);
}
