//! Label sequence generation
//!
//! Aligns entity spans with tokens block by block:
//! - each block is tokenized and every char of it mapped to its token
//! - entity boundaries falling between tokens are repaired by moving the
//!   start forward and the end backward to the nearest token char
//! - covered tokens get the entity type; later entities overwrite earlier

use std::collections::HashSet;
use std::fmt::Write as _;

use serde::Serialize;

use standoff_core::span::char_slice;
use standoff_core::{Document, Entity, LabelScheme, LabelingConfig, Span};

use crate::tokenize::{SentenceSplitter, WordPunctTokenizer};
use crate::SpanTokenizer;

pub const DEFAULT_OUTSIDE_LABEL: &str = "O";

// ============================================================================
// Output
// ============================================================================

/// Tokens of one block with document-absolute spans, and one label per token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockLabels {
    pub span: Span,
    pub tokens: Vec<(String, Span)>,
    pub labels: Vec<String>,
    /// Ids of entities whose bounds fall inside a token or between tokens
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub misaligned: Vec<String>,
}

impl BlockLabels {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Label sequences of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentLabels {
    pub uid: String,
    pub blocks: Vec<BlockLabels>,
}

impl DocumentLabels {
    /// Two-column `token<TAB>label` rows, blocks separated by a blank line
    pub fn to_conll(&self) -> String {
        let mut out = String::new();
        for block in self.blocks.iter().filter(|b| !b.is_empty()) {
            for ((token, _), label) in block.tokens.iter().zip(&block.labels) {
                let _ = writeln!(out, "{token}\t{label}");
            }
            out.push('\n');
        }
        out
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Turns documents into per-block token label sequences
pub struct LabelSequenceGenerator {
    outside_label: String,
    tokenizer: Box<dyn SpanTokenizer>,
    splitter: Box<dyn SpanTokenizer>,
    filter_labels: Option<HashSet<String>>,
    scheme: LabelScheme,
}

impl Default for LabelSequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelSequenceGenerator {
    /// Sentence blocks, word/punctuation tokens, plain labels
    pub fn new() -> Self {
        Self {
            outside_label: DEFAULT_OUTSIDE_LABEL.to_string(),
            tokenizer: Box::new(WordPunctTokenizer),
            splitter: Box::new(SentenceSplitter),
            filter_labels: None,
            scheme: LabelScheme::Plain,
        }
    }

    pub fn from_config(config: &LabelingConfig) -> Self {
        let generator = Self::new()
            .with_outside_label(config.outside_label.clone())
            .with_scheme(config.scheme);
        match &config.filter_labels {
            Some(labels) => generator.with_filter_labels(labels.iter().cloned()),
            None => generator,
        }
    }

    pub fn with_outside_label(mut self, label: impl Into<String>) -> Self {
        self.outside_label = label.into();
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: impl SpanTokenizer + 'static) -> Self {
        self.tokenizer = Box::new(tokenizer);
        self
    }

    pub fn with_splitter(mut self, splitter: impl SpanTokenizer + 'static) -> Self {
        self.splitter = Box::new(splitter);
        self
    }

    /// Only label entities of these types
    pub fn with_filter_labels(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter_labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_scheme(mut self, scheme: LabelScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn outside_label(&self) -> &str {
        &self.outside_label
    }

    pub fn split_blocks(&self, text: &str) -> Vec<(String, Span)> {
        self.splitter.span_tokenize(text)
    }

    fn accepts(&self, entity: &Entity) -> bool {
        self.filter_labels
            .as_ref()
            .map_or(true, |labels| labels.contains(&entity.entity_type))
    }

    /// Label every block of `doc`
    pub fn transform_document(&self, doc: &Document) -> DocumentLabels {
        let blocks = self
            .split_blocks(&doc.text)
            .into_iter()
            .map(|(block_text, block_span)| self.transform_block(doc, &block_text, block_span))
            .collect();

        DocumentLabels {
            uid: doc.uid.clone(),
            blocks,
        }
    }

    fn transform_block(&self, doc: &Document, block_text: &str, block_span: Span) -> BlockLabels {
        let tokens = self.tokenizer.span_tokenize(block_text);
        let char_to_token = char_token_map(&tokens);
        let mut labels = vec![self.outside_label.clone(); tokens.len()];
        let mut misaligned = Vec::new();

        for entity in doc.entities() {
            if !entity.span.within_span(&block_span) || !self.accepts(entity) {
                continue;
            }

            let start = entity.span.start() - block_span.start();
            let end = entity.span.end() - block_span.start();
            let Some(range) = token_range(&char_to_token, start, end) else {
                tracing::warn!(
                    "Entity {} ({}) in {} covers no token: \"{}\"",
                    entity.id,
                    entity.entity_type,
                    doc.uid,
                    char_slice(block_text, start, end).trim()
                );
                misaligned.push(entity.id.clone());
                continue;
            };
            let aligned = tokens[range.first].1.start() == start && tokens[range.last].1.end() == end;
            if range.repaired || !aligned {
                tracing::warn!(
                    "Entity {} ({}) in {} is not aligned with token boundaries: \"{}\"",
                    entity.id,
                    entity.entity_type,
                    doc.uid,
                    char_slice(block_text, start, end).trim()
                );
                misaligned.push(entity.id.clone());
            }

            for (offset, slot) in labels[range.first..=range.last].iter_mut().enumerate() {
                *slot = match self.scheme {
                    LabelScheme::Plain => entity.entity_type.clone(),
                    LabelScheme::Bio if offset == 0 => format!("B-{}", entity.entity_type),
                    LabelScheme::Bio => format!("I-{}", entity.entity_type),
                };
            }
        }

        let shift = block_span.start() as isize;
        BlockLabels {
            span: block_span,
            tokens: tokens
                .into_iter()
                .map(|(token, span)| (token, span.shift(shift)))
                .collect(),
            labels,
            misaligned,
        }
    }

    /// Lazily label each document in turn. Calling again with the same
    /// collection starts over.
    pub fn transform_documents<'a, I>(&'a self, documents: I) -> impl Iterator<Item = DocumentLabels> + 'a
    where
        I: IntoIterator<Item = &'a Document>,
        I::IntoIter: 'a,
    {
        documents.into_iter().map(move |doc| self.transform_document(doc))
    }

    /// Like [`transform_documents`](Self::transform_documents), calling
    /// `progress` with the running count after each document
    pub fn transform_documents_with_progress<'a, I, F>(
        &'a self,
        documents: I,
        mut progress: F,
    ) -> impl Iterator<Item = DocumentLabels> + 'a
    where
        I: IntoIterator<Item = &'a Document>,
        I::IntoIter: 'a,
        F: FnMut(usize) + 'a,
    {
        self.transform_documents(documents)
            .enumerate()
            .map(move |(done, labels)| {
                progress(done + 1);
                labels
            })
    }
}

// ============================================================================
// Alignment
// ============================================================================

/// Owning token index per block char; `None` between tokens
fn char_token_map(tokens: &[(String, Span)]) -> Vec<Option<usize>> {
    let len = tokens.last().map_or(0, |(_, span)| span.end());
    let mut map = vec![None; len];
    for (index, (_, span)) in tokens.iter().enumerate() {
        for slot in &mut map[span.start().min(len)..span.end().min(len)] {
            *slot = Some(index);
        }
    }
    map
}

#[derive(Debug, PartialEq, Eq)]
struct TokenRange {
    first: usize,
    last: usize,
    repaired: bool,
}

/// Inclusive token range for block chars `[start, end)`
fn token_range(map: &[Option<usize>], start: usize, end: usize) -> Option<TokenRange> {
    let last_char = end.checked_sub(1)?;
    if last_char < start {
        return None;
    }
    let lookup = |offset: usize| map.get(offset).copied().flatten();

    let first = (start..=last_char).find_map(lookup)?;
    let last = (start..=last_char).rev().find_map(lookup)?;
    Some(TokenRange {
        first,
        last,
        repaired: lookup(start).is_none() || lookup(last_char).is_none(),
    })
}
