//! Span tokenizers and block splitters
//!
//! Every implementation reports char offsets, matching the offsets used by
//! annotations. Underlying matchers work on byte offsets; [`CharSpans`]
//! converts them in a single forward pass.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use standoff_core::Span;

use crate::SpanTokenizer;

static WORD_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+|[^\w\s]+").expect("word/punct pattern is valid"));

static NON_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("non-space pattern is valid"));

// ============================================================================
// Byte to char offsets
// ============================================================================

/// Converts ascending byte-offset pieces of one text into char spans
struct CharSpans<'a> {
    text: &'a str,
    byte: usize,
    char: usize,
}

impl<'a> CharSpans<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, byte: 0, char: 0 }
    }

    fn advance_to(&mut self, byte: usize) -> usize {
        if byte > self.byte {
            self.char += self.text[self.byte..byte].chars().count();
            self.byte = byte;
        }
        self.char
    }

    /// Char span of `piece`, which starts at byte `start`. Pieces must be
    /// supplied in ascending, non-overlapping order.
    fn span(&mut self, start: usize, piece: &str) -> (String, Span) {
        let char_start = self.advance_to(start);
        let char_end = self.advance_to(start + piece.len());
        (piece.to_string(), Span::new(char_start, char_end))
    }

    fn collect<I>(text: &'a str, pieces: I) -> Vec<(String, Span)>
    where
        I: IntoIterator<Item = (usize, &'a str)>,
    {
        let mut spans = Self::new(text);
        pieces
            .into_iter()
            .map(|(start, piece)| spans.span(start, piece))
            .collect()
    }
}

/// Drop surrounding whitespace from a byte-offset piece
fn trimmed(start: usize, piece: &str) -> Option<(usize, &str)> {
    let without_leading = piece.trim_start();
    let leading = piece.len() - without_leading.len();
    let inner = without_leading.trim_end();
    (!inner.is_empty()).then_some((start + leading, inner))
}

// ============================================================================
// Tokenizers
// ============================================================================

/// Alphanumeric runs and punctuation runs as separate tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct WordPunctTokenizer;

impl SpanTokenizer for WordPunctTokenizer {
    fn span_tokenize(&self, text: &str) -> Vec<(String, Span)> {
        CharSpans::collect(text, WORD_PUNCT.find_iter(text).map(|m| (m.start(), m.as_str())))
    }
}

/// Maximal runs of non-whitespace
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl SpanTokenizer for WhitespaceTokenizer {
    fn span_tokenize(&self, text: &str) -> Vec<(String, Span)> {
        CharSpans::collect(text, NON_SPACE.find_iter(text).map(|m| (m.start(), m.as_str())))
    }
}

/// Unicode (UAX #29) words; punctuation is dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeWordTokenizer;

impl SpanTokenizer for UnicodeWordTokenizer {
    fn span_tokenize(&self, text: &str) -> Vec<(String, Span)> {
        CharSpans::collect(text, text.unicode_word_indices())
    }
}

// ============================================================================
// Block splitters
// ============================================================================

/// Unicode (UAX #29) sentences with surrounding whitespace removed
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceSplitter;

impl SpanTokenizer for SentenceSplitter {
    fn span_tokenize(&self, text: &str) -> Vec<(String, Span)> {
        CharSpans::collect(
            text,
            text.split_sentence_bound_indices()
                .filter_map(|(start, piece)| trimmed(start, piece)),
        )
    }
}

/// Non-blank lines with surrounding whitespace removed
#[derive(Debug, Clone, Copy, Default)]
pub struct LineSplitter;

impl SpanTokenizer for LineSplitter {
    fn span_tokenize(&self, text: &str) -> Vec<(String, Span)> {
        let mut offset = 0;
        let lines = text.split('\n').filter_map(move |line| {
            let start = offset;
            offset += line.len() + 1;
            trimmed(start, line)
        });
        CharSpans::collect(text, lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use standoff_core::span::char_slice;

    fn words(pieces: &[(String, Span)]) -> Vec<&str> {
        pieces.iter().map(|(w, _)| w.as_str()).collect()
    }

    #[test]
    fn test_word_punct() {
        let tokens = WordPunctTokenizer.span_tokenize("Hello, world! (IL-2)");
        assert_eq!(words(&tokens), vec!["Hello", ",", "world", "!", "(", "IL", "-", "2", ")"]);
        assert_eq!(tokens[0].1, Span::new(0, 5));
        assert_eq!(tokens[2].1, Span::new(7, 12));
        assert_eq!(tokens[4].1, Span::new(14, 15));
    }

    #[test]
    fn test_punct_runs_stay_together() {
        let tokens = WordPunctTokenizer.span_tokenize("wait...?! ok");
        assert_eq!(words(&tokens), vec!["wait", "...?!", "ok"]);
    }

    #[test]
    fn test_char_offsets_after_multibyte() {
        let text = "naïve café au lait";
        let tokens = WordPunctTokenizer.span_tokenize(text);
        assert_eq!(words(&tokens), vec!["naïve", "café", "au", "lait"]);
        assert_eq!(tokens[1].1, Span::new(6, 10));
        assert_eq!(tokens[3].1, Span::new(14, 18));
    }

    #[test]
    fn test_whitespace() {
        let tokens = WhitespaceTokenizer.span_tokenize("  a-b  c.\td ");
        assert_eq!(words(&tokens), vec!["a-b", "c.", "d"]);
        assert_eq!(tokens[2].1, Span::new(10, 11));
    }

    #[test]
    fn test_unicode_words() {
        let tokens = UnicodeWordTokenizer.span_tokenize("The quick (\"brown\") fox can't");
        assert_eq!(words(&tokens), vec!["The", "quick", "brown", "fox", "can't"]);
        assert_eq!(tokens[2].1, Span::new(12, 17));
    }

    #[test]
    fn test_sentences() {
        let text = "Mr. Smith left.  He came back! Then?  ";
        let blocks = SentenceSplitter.span_tokenize(text);
        assert!(blocks.len() >= 2);
        for (block, span) in &blocks {
            assert_eq!(char_slice(text, span.start(), span.end()), block);
            assert_eq!(block.trim(), block);
        }
        assert_eq!(blocks.last().map(|(b, _)| b.as_str()), Some("Then?"));
    }

    #[test]
    fn test_lines() {
        let text = "first line\n\n  second\r\nthird";
        let blocks = LineSplitter.span_tokenize(text);
        assert_eq!(words(&blocks), vec!["first line", "second", "third"]);
        assert_eq!(blocks[1].1, Span::new(14, 20));
        assert_eq!(blocks[2].1, Span::new(22, 27));
    }

    proptest! {
        #[test]
        fn prop_tokens_address_text(text in "[a-zé .,!\\n-]{0,60}") {
            for tokenizer in [&WordPunctTokenizer as &dyn SpanTokenizer, &WhitespaceTokenizer, &LineSplitter] {
                let tokens = tokenizer.span_tokenize(&text);
                let mut previous_end = 0;
                for (token, span) in &tokens {
                    prop_assert!(span.start() >= previous_end);
                    prop_assert_eq!(char_slice(&text, span.start(), span.end()), token.as_str());
                    previous_end = span.end();
                }
            }
        }
    }
}
