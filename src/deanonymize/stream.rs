//! Chunk-safe streaming restoration.
//!
//! The upstream model streams text deltas that can split a placeholder at
//! any byte boundary:
//!
//! ```text
//! chunk 1: "Please contact <PER"
//! chunk 2: "SON_1> for help"
//! ```
//!
//! Emitting chunk 1 as-is would leak a half token nothing can fix later.
//! The buffer keeps a carry of at most one potential placeholder prefix
//! and emits every other byte as soon as it arrives.
//!
//! Carry rule: after appending a chunk, find the last `<`. If the run
//! from it has no closing `>` and is short enough to still become a
//! placeholder, hold it back; everything before it is safe. A run longer
//! than the maximum placeholder length cannot be a placeholder and is
//! emitted verbatim. Complete in-grammar tokens in the safe region are
//! restored through the exact pass — fuzzy variants are intentionally
//! not handled here, because `[`, `{` and `(` are everyday prose and
//! gating on them would stall every chunk.

use std::sync::Arc;

use crate::anonymize::Mapping;
use crate::deanonymize::exact_restore;

/// Sliding suffix-carry buffer over one response stream.
///
/// Pure state machine: the carry string plus the mapping reference,
/// driven by [`push`](StreamBuffer::push) and
/// [`flush`](StreamBuffer::flush). Within one stream, output order equals
/// input order.
pub struct StreamBuffer {
    mapping: Arc<Mapping>,
    carry: String,
    max_placeholder_length: usize,
}

impl StreamBuffer {
    pub fn new(mapping: Arc<Mapping>, max_placeholder_length: usize) -> Self {
        Self {
            mapping,
            carry: String::new(),
            max_placeholder_length,
        }
    }

    /// Feed one chunk; returns the text that is now safe to emit.
    ///
    /// The concatenation of all returned text plus the final
    /// [`flush`](StreamBuffer::flush) equals the exact-pass restoration of
    /// the concatenated input.
    pub fn push(&mut self, chunk: &str) -> String {
        if chunk.is_empty() {
            return String::new();
        }
        self.carry.push_str(chunk);

        let split = self.safe_split_point();
        if split == 0 {
            return String::new();
        }

        let safe: String = self.carry.drain(..split).collect();
        exact_restore(&safe, &self.mapping, self.max_placeholder_length).text
    }

    /// End of stream: emit the carry unchanged. An unclosed fragment at
    /// this point can never complete, so it goes out verbatim.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.carry)
    }

    /// Bytes currently held back.
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }

    /// Byte offset up to which the carry is safe to emit.
    fn safe_split_point(&self) -> usize {
        let Some(open) = self.carry.rfind('<') else {
            return self.carry.len();
        };

        let run = &self.carry[open..];
        if run.contains('>') {
            // The last potential token closed; whole carry is safe.
            return self.carry.len();
        }
        if run.chars().count() > self.max_placeholder_length {
            // Too long to ever satisfy the grammar.
            return self.carry.len();
        }
        open
    }
}
