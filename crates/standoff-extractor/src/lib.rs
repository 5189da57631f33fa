//! Standoff Extractor - Token alignment for sequence labeling
//!
//! Maps char-offset entity spans onto tokenizer output and produces
//! per-token label sequences, one per text block.

use standoff_core::Span;

/// Anything that cuts a text into ordered, non-overlapping pieces with
/// their char spans. Used both for block splitting and for tokenization.
pub trait SpanTokenizer: Send + Sync {
    fn span_tokenize(&self, text: &str) -> Vec<(String, Span)>;
}

pub mod labels;
pub mod tokenize;

pub use labels::{BlockLabels, DocumentLabels, LabelSequenceGenerator};
pub use tokenize::{
    LineSplitter, SentenceSplitter, UnicodeWordTokenizer, WhitespaceTokenizer, WordPunctTokenizer,
};
