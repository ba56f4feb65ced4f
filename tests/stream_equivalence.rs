//! Stream buffer properties: chunking-independence and bounded carry.

use std::sync::Arc;

use veilgate::anonymize::{Mapping, Strategy};
use veilgate::deanonymize::{Deanonymizer, StreamBuffer};

fn mapping() -> Arc<Mapping> {
    let m = Mapping::new("default");
    Strategy::Placeholder.apply("Alice", "PERSON", &m);
    Strategy::Placeholder.apply("13800138000", "PHONE", &m);
    Strategy::Placeholder.apply("john@example.com", "EMAIL", &m);
    Arc::new(m)
}

/// Run chunks through a fresh buffer; returns concatenated output.
fn stream(chunks: &[&str], max_len: usize) -> String {
    let mut buffer = StreamBuffer::new(mapping(), max_len);
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&buffer.push(chunk));
    }
    out.push_str(&buffer.flush());
    out
}

fn unary(text: &str) -> String {
    Deanonymizer::new(false, 0.85, 25).restore(text, &mapping()).text
}

#[test]
fn every_two_way_chunking_matches_unary_restore() {
    let text = "Hi <PERSON_1>, call <PHONE_1> or write <EMAIL_1>. Also 1<2 and a<b>c.";
    let expected = unary(text);

    for split in 0..=text.len() {
        if !text.is_char_boundary(split) {
            continue;
        }
        let streamed = stream(&[&text[..split], &text[split..]], 25);
        assert_eq!(streamed, expected, "split at {split}");
    }
}

#[test]
fn fixed_size_chunkings_match_unary_restore() {
    let text = "Dear <PERSON_1>: your number <PHONE_1> and mail <EMAIL_1> are on file. <UNMAPPED_9> stays.";
    let expected = unary(text);

    for size in [1, 2, 3, 5, 7, 11, 64] {
        let chunks: Vec<&str> = chunk_by(text, size);
        let mut buffer = StreamBuffer::new(mapping(), 25);
        let mut out = String::new();
        for chunk in &chunks {
            out.push_str(&buffer.push(chunk));
        }
        out.push_str(&buffer.flush());
        assert_eq!(out, expected, "chunk size {size}");
    }
}

#[test]
fn carry_is_bounded_by_max_placeholder_length() {
    let text = "aaa <PERSON_1> bbb <PHONE_1> c<d <EMA".repeat(20);
    let mut buffer = StreamBuffer::new(mapping(), 25);
    for chunk in chunk_by(&text, 4) {
        buffer.push(chunk);
        assert!(
            buffer.pending_len() <= 25,
            "carry grew to {}",
            buffer.pending_len()
        );
    }
}

#[test]
fn seed_scenario_stream_split_placeholder() {
    let mut buffer = StreamBuffer::new(mapping(), 25);
    let first = buffer.push("Hi <PER");
    let second = buffer.push("SON_1>, bye");
    assert_eq!(first, "Hi ");
    assert_eq!(second, "Alice, bye");
    assert!(buffer.flush().is_empty());
}

#[test]
fn seed_scenario_short_html_tag_passes_verbatim() {
    let mut buffer = StreamBuffer::new(mapping(), 25);
    let mut out = String::new();
    for _ in 0..3 {
        out.push_str(&buffer.push("Compare <tag>"));
    }
    out.push_str(&buffer.flush());
    assert_eq!(out, "Compare <tag>".repeat(3));
}

#[test]
fn output_chunks_preserve_input_order() {
    let mut buffer = StreamBuffer::new(mapping(), 25);
    let outputs: Vec<String> = ["one ", "two <PERSON_1", "> three", " four"]
        .iter()
        .map(|c| buffer.push(c))
        .collect();
    let whole = outputs.concat() + &buffer.flush();
    assert_eq!(whole, "one two Alice three four");
}

fn chunk_by(text: &str, size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        chunks.push(&text[start..end]);
        start = end;
    }
    chunks
}
