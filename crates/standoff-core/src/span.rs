//! Span algebra
//!
//! Character ranges addressed by standoff annotations. Offsets count
//! Unicode scalar values, not bytes, so every text extraction goes
//! through [`char_slice`].
//!
//! - [`Span`]: a half-open continuous range
//! - [`DiscontinuousSpan`]: one mention split across gaps
//! - [`TextSpan`]: either of the two, as carried by an entity

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Char-offset helpers
// ============================================================================

/// Slice `text` by char offsets. Offsets past the end are clamped.
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let byte_at = |offset: usize| {
        text.char_indices()
            .nth(offset)
            .map(|(idx, _)| idx)
            .unwrap_or(text.len())
    };

    let byte_start = byte_at(start);
    let byte_end = byte_at(end.max(start));
    &text[byte_start..byte_end]
}

/// Number of chars in `text`
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Char-to-byte offset table over one text, for slicing it repeatedly.
///
/// [`char_slice`] walks the text on every call; this walks it once.
#[derive(Debug, Clone)]
pub struct CharIndex<'a> {
    text: &'a str,
    /// Byte offset of every char, followed by `text.len()`
    bytes: Vec<usize>,
}

impl<'a> CharIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut bytes: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
        bytes.push(text.len());
        Self { text, bytes }
    }

    /// Number of chars in the indexed text
    pub fn len(&self) -> usize {
        self.bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same result as [`char_slice`] on the indexed text
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let byte_at = |offset: usize| self.bytes[offset.min(self.len())];
        &self.text[byte_at(start)..byte_at(end.max(start))]
    }

    /// Same result as [`TextSpan::text`] on the indexed text
    pub fn span_text(&self, span: &TextSpan) -> String {
        span.subspans()
            .iter()
            .map(|s| self.slice(s.start(), s.end()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// Span
// ============================================================================

/// Half-open character range `[start, end)`.
///
/// Ordering is lexicographic on `(start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    /// Create a span. `start` must not exceed `end`.
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} exceeds end {end}");
        Self { start, end }
    }

    /// Create a span, returning `None` when `start > end`
    pub fn checked(start: usize, end: usize) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn length(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when this span lies inside `other` (bounds inclusive)
    pub fn within(&self, other: &Span) -> bool {
        self.start >= other.start && self.end <= other.end
    }

    /// True when the intersection with `other` has positive length
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }

    /// Translate both bounds by `delta`, saturating at zero
    pub fn shift(&self, delta: isize) -> Span {
        Span {
            start: self.start.saturating_add_signed(delta),
            end: self.end.saturating_add_signed(delta),
        }
    }

    /// Text addressed by this span
    pub fn text<'a>(&self, text: &'a str) -> &'a str {
        char_slice(text, self.start, self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl From<(usize, usize)> for Span {
    fn from((start, end): (usize, usize)) -> Self {
        Span::new(start, end)
    }
}

impl Serialize for Span {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.start, self.end).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Span {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (start, end) = <(usize, usize)>::deserialize(deserializer)?;
        Span::checked(start, end)
            .ok_or_else(|| serde::de::Error::custom(format!("span start {start} exceeds end {end}")))
    }
}

// ============================================================================
// Discontinuous span
// ============================================================================

/// A mention made of several disjoint ranges.
///
/// Subspans are stored sorted and deduplicated. `length` sums the subspans,
/// so the gaps between them do not count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscontinuousSpan {
    subspans: Vec<Span>,
}

impl DiscontinuousSpan {
    /// Build from subspans. Returns `None` when empty or when two
    /// subspans overlap.
    pub fn new(spans: impl IntoIterator<Item = Span>) -> Option<Self> {
        let mut subspans: Vec<Span> = spans.into_iter().collect();
        subspans.sort();
        subspans.dedup();

        if subspans.is_empty() || subspans.windows(2).any(|w| w[0].overlaps(&w[1])) {
            return None;
        }

        Some(Self { subspans })
    }

    /// Ascending view of the subspans
    pub fn subspans(&self) -> &[Span] {
        &self.subspans
    }

    pub fn start(&self) -> usize {
        self.subspans[0].start
    }

    pub fn end(&self) -> usize {
        self.subspans.iter().map(Span::end).max().unwrap_or(0)
    }

    pub fn length(&self) -> usize {
        self.subspans.iter().map(Span::length).sum()
    }

    pub fn shift(&self, delta: isize) -> DiscontinuousSpan {
        DiscontinuousSpan {
            subspans: self.subspans.iter().map(|s| s.shift(delta)).collect(),
        }
    }

    /// Subspan texts joined by a single space
    pub fn text(&self, text: &str) -> String {
        self.subspans
            .iter()
            .map(|s| s.text(text))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for DiscontinuousSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.subspans.iter().map(Span::to_string).collect();
        write!(f, "{}", parts.join(";"))
    }
}

impl Serialize for DiscontinuousSpan {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.subspans.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DiscontinuousSpan {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let spans = Vec::<Span>::deserialize(deserializer)?;
        DiscontinuousSpan::new(spans)
            .ok_or_else(|| serde::de::Error::custom("empty or overlapping subspans"))
    }
}

// ============================================================================
// Entity location
// ============================================================================

/// Where an entity sits in the text.
///
/// Predicates are evaluated subspan-wise: a discontinuous span is `within`
/// another location when every one of its subspans lies inside some subspan
/// of the other, and two locations `overlap` when any pair of their subspans
/// does. Gaps never count as covered text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextSpan {
    Continuous(Span),
    Discontinuous(DiscontinuousSpan),
}

impl TextSpan {
    pub fn subspans(&self) -> &[Span] {
        match self {
            Self::Continuous(span) => std::slice::from_ref(span),
            Self::Discontinuous(span) => span.subspans(),
        }
    }

    pub fn start(&self) -> usize {
        match self {
            Self::Continuous(span) => span.start(),
            Self::Discontinuous(span) => span.start(),
        }
    }

    pub fn end(&self) -> usize {
        match self {
            Self::Continuous(span) => span.end(),
            Self::Discontinuous(span) => span.end(),
        }
    }

    pub fn length(&self) -> usize {
        match self {
            Self::Continuous(span) => span.length(),
            Self::Discontinuous(span) => span.length(),
        }
    }

    /// Smallest continuous span covering every subspan
    pub fn bounds(&self) -> Span {
        Span::new(self.start(), self.end())
    }

    pub fn is_discontinuous(&self) -> bool {
        matches!(self, Self::Discontinuous(_))
    }

    pub fn within(&self, other: &TextSpan) -> bool {
        self.subspans()
            .iter()
            .all(|s| other.subspans().iter().any(|o| s.within(o)))
    }

    /// Shorthand for `within` against a continuous span
    pub fn within_span(&self, other: &Span) -> bool {
        self.subspans().iter().all(|s| s.within(other))
    }

    pub fn overlaps(&self, other: &TextSpan) -> bool {
        self.subspans()
            .iter()
            .any(|s| other.subspans().iter().any(|o| s.overlaps(o)))
    }

    pub fn shift(&self, delta: isize) -> TextSpan {
        match self {
            Self::Continuous(span) => Self::Continuous(span.shift(delta)),
            Self::Discontinuous(span) => Self::Discontinuous(span.shift(delta)),
        }
    }

    pub fn text(&self, text: &str) -> String {
        match self {
            Self::Continuous(span) => span.text(text).to_string(),
            Self::Discontinuous(span) => span.text(text),
        }
    }

    /// Offsets in row form: `start end[;start end...]`
    pub fn to_offsets(&self) -> String {
        self.subspans()
            .iter()
            .map(|s| format!("{} {}", s.start(), s.end()))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for TextSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous(span) => span.fmt(f),
            Self::Discontinuous(span) => span.fmt(f),
        }
    }
}

impl From<Span> for TextSpan {
    fn from(span: Span) -> Self {
        Self::Continuous(span)
    }
}

impl From<DiscontinuousSpan> for TextSpan {
    fn from(span: DiscontinuousSpan) -> Self {
        Self::Discontinuous(span)
    }
}

// ============================================================================
// Tests
// ============================================================================
