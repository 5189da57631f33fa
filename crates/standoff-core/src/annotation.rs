//! Annotation taxonomy
//!
//! One variant per standoff record kind. Each row is tab-delimited and the
//! first character of its id selects the kind:
//!
//! | Tag | Kind          | Row                                           |
//! |-----|---------------|-----------------------------------------------|
//! | `T` | Entity        | `T1\tType 0 5[;7 9]\tcontent`                 |
//! | `A` | Attribute     | `A1\tName T1[ value]`                         |
//! | `N` | Normalization | `N1\tType T1 Resource:Entry\tentry value`     |
//! | `R` | Relation      | `R1\tType Role1:T1 Role2:T2`                  |
//! | `#` | Note          | `#1\tType T1\tnote text`                      |
//! | `*` | Equiv         | `*\tType T1 T2 T3`                            |
//!
//! Event rows (`E`) are recognized and dropped.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::span::{char_len, DiscontinuousSpan, Span, TextSpan};
use crate::{Result, StandoffError};

const EVENT_TAG: char = 'E';

// ============================================================================
// Kinds
// ============================================================================

/// Annotation kinds, in the order merged documents receive them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Entity,
    Relation,
    Attribute,
    Normalization,
    Note,
    Equiv,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 6] = [
        Self::Entity,
        Self::Relation,
        Self::Attribute,
        Self::Normalization,
        Self::Note,
        Self::Equiv,
    ];

    /// Leading id character
    pub fn tag(&self) -> char {
        match self {
            Self::Entity => 'T',
            Self::Relation => 'R',
            Self::Attribute => 'A',
            Self::Normalization => 'N',
            Self::Note => '#',
            Self::Equiv => '*',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Bucket name used by the document store
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Entity => "entities",
            Self::Relation => "relations",
            Self::Attribute => "attributes",
            Self::Normalization => "normalizations",
            Self::Note => "notes",
            Self::Equiv => "equivs",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Relation => "relation",
            Self::Attribute => "attribute",
            Self::Normalization => "normalization",
            Self::Note => "note",
            Self::Equiv => "equiv",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnnotationKind {
    type Err = StandoffError;

    /// Accepts the singular or plural name, case-insensitive
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower || kind.plural() == lower)
            .ok_or_else(|| StandoffError::InvalidArgument(format!("unknown annotation kind: {s}")))
    }
}

// ============================================================================
// Ids
// ============================================================================

/// Numeric part of an id (`T12` -> 12)
pub fn numeric_suffix(id: &str) -> Option<u64> {
    let mut chars = id.chars();
    chars.next()?;
    chars.as_str().parse().ok()
}

/// Add `delta` to the numeric part of an id, keeping its tag character.
/// Ids without a numeric part are returned unchanged.
pub fn shift_id(id: &str, delta: u64) -> String {
    match (id.chars().next(), numeric_suffix(id)) {
        (Some(tag), Some(n)) => format!("{}{}", tag, n + delta),
        _ => id.to_string(),
    }
}

// ============================================================================
// Variants
// ============================================================================

/// Text-bound mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub span: TextSpan,
    pub content: String,
}

impl Entity {
    /// Create an entity. A continuous span paired with multi-line content
    /// is re-expressed as one subspan per content line.
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        span: impl Into<TextSpan>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let span = match span.into() {
            TextSpan::Continuous(span) if content.contains('\n') => {
                split_lines(span.start(), &content)
            }
            span => span,
        };

        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            span,
            content,
        }
    }

    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().splitn(3, '\t').collect();
        let [id, info, content] = fields[..] else {
            return Err(StandoffError::malformed(line, "entity needs 3 tab-separated fields"));
        };

        let (entity_type, offsets) = info
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| StandoffError::malformed(line, "entity type without offsets"))?;

        let spans = offsets
            .split(';')
            .map(|pair| parse_offsets(line, pair))
            .collect::<Result<Vec<Span>>>()?;

        let span = if spans.len() > 1 {
            DiscontinuousSpan::new(spans)
                .map(TextSpan::Discontinuous)
                .ok_or_else(|| StandoffError::malformed(line, "overlapping entity fragments"))?
        } else {
            TextSpan::Continuous(spans[0])
        };

        Ok(Self::new(id, entity_type, span, content.trim()))
    }

    /// Newlines in the content are written as spaces; the span keeps its
    /// fragments, so a re-parse yields the flattened content. Parsing also
    /// trims the content, so leading or trailing whitespace does not
    /// survive a round trip either.
    pub fn to_row(&self) -> String {
        format!(
            "{}\t{} {}\t{}",
            self.id,
            self.entity_type,
            self.span.to_offsets(),
            self.content.replace('\n', " ")
        )
    }
}

fn parse_offsets(line: &str, pair: &str) -> Result<Span> {
    let numbers: Vec<&str> = pair.split_whitespace().collect();
    let [start, end] = numbers[..] else {
        return Err(StandoffError::malformed(line, format!("bad offset pair '{pair}'")));
    };

    let start: usize = start
        .parse()
        .map_err(|_| StandoffError::malformed(line, format!("bad start offset '{start}'")))?;
    let end: usize = end
        .parse()
        .map_err(|_| StandoffError::malformed(line, format!("bad end offset '{end}'")))?;

    Span::checked(start, end)
        .ok_or_else(|| StandoffError::malformed(line, format!("start {start} exceeds end {end}")))
}

/// One subspan per content line, each newline consuming one offset
fn split_lines(start: usize, content: &str) -> TextSpan {
    let mut offset = start;
    let mut spans = Vec::new();
    for part in content.split('\n') {
        let len = char_len(part);
        spans.push(Span::new(offset, offset + len));
        offset += len + 1;
    }

    match DiscontinuousSpan::new(spans) {
        Some(span) => TextSpan::Discontinuous(span),
        None => TextSpan::Continuous(Span::new(start, offset.saturating_sub(1))),
    }
}

/// Attribute value: a bare flag or an explicit value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Flag,
    Value(String),
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Flag => serializer.serialize_bool(true),
            Self::Value(value) => serializer.serialize_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub id: String,
    pub name: String,
    pub target: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split('\t').collect();
        let [id, info] = fields[..] else {
            return Err(StandoffError::malformed(line, "attribute needs 2 tab-separated fields"));
        };

        let parts: Vec<&str> = info.split_whitespace().collect();
        let (name, target, value) = match parts[..] {
            [name, target] => (name, target, AttributeValue::Flag),
            [name, target, value] => (name, target, AttributeValue::Value(value.to_string())),
            _ => return Err(StandoffError::malformed(line, "attribute needs name, target and optional value")),
        };

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            target: target.to_string(),
            value,
        })
    }

    pub fn to_row(&self) -> String {
        match &self.value {
            AttributeValue::Flag => format!("{}\t{} {}", self.id, self.name, self.target),
            AttributeValue::Value(value) => {
                format!("{}\t{} {} {}", self.id, self.name, self.target, value)
            }
        }
    }
}

/// Reference from an annotation to an external knowledge-base entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Normalization {
    pub id: String,
    #[serde(rename = "type")]
    pub norm_type: String,
    pub target: String,
    pub resource_id: String,
    pub entry_id: String,
    pub entry_value: String,
}

impl Normalization {
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split('\t').collect();
        let [id, info, entry_value] = fields[..] else {
            return Err(StandoffError::malformed(line, "normalization needs 3 tab-separated fields"));
        };

        let parts: Vec<&str> = info.split_whitespace().collect();
        let [norm_type, target, external] = parts[..] else {
            return Err(StandoffError::malformed(line, "normalization needs type, target and reference"));
        };
        let (resource_id, entry_id) = external
            .split_once(':')
            .ok_or_else(|| StandoffError::malformed(line, "reference must be Resource:Entry"))?;

        Ok(Self {
            id: id.to_string(),
            norm_type: norm_type.to_string(),
            target: target.to_string(),
            resource_id: resource_id.to_string(),
            entry_id: entry_id.to_string(),
            entry_value: entry_value.trim().to_string(),
        })
    }

    pub fn to_row(&self) -> String {
        format!(
            "{}\t{} {} {}:{}\t{}",
            self.id, self.norm_type, self.target, self.resource_id, self.entry_id, self.entry_value
        )
    }
}

/// Typed link between annotations. Argument order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relation {
    pub id: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(serialize_with = "serialize_arguments")]
    pub arguments: Vec<(String, String)>,
}

impl Relation {
    pub fn new(
        id: impl Into<String>,
        relation_type: impl Into<String>,
        arguments: Vec<(String, String)>,
    ) -> Self {
        Self {
            id: id.into(),
            relation_type: relation_type.into(),
            arguments,
        }
    }

    pub fn parse(line: &str) -> Result<Self> {
        let info = line
            .trim()
            .split('\t')
            .nth(1)
            .ok_or_else(|| StandoffError::malformed(line, "relation needs an info field"))?;

        let mut parts = info.split_whitespace();
        let relation_type = parts
            .next()
            .ok_or_else(|| StandoffError::malformed(line, "relation without type"))?;

        let arguments = parts
            .map(|arg| {
                arg.split_once(':')
                    .map(|(role, target)| (role.to_string(), target.to_string()))
                    .ok_or_else(|| StandoffError::malformed(line, format!("bad argument '{arg}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        if arguments.is_empty() {
            return Err(StandoffError::malformed(line, "relation without arguments"));
        }

        let id = line.trim().split('\t').next().unwrap_or_default();
        Ok(Self::new(id, relation_type, arguments))
    }

    /// Target of the given role
    pub fn argument(&self, role: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|(r, _)| r == role)
            .map(|(_, target)| target.as_str())
    }

    pub fn to_row(&self) -> String {
        let args: Vec<String> = self
            .arguments
            .iter()
            .map(|(role, target)| format!("{role}:{target}"))
            .collect();
        format!("{}\t{} {}", self.id, self.relation_type, args.join(" "))
    }
}

fn serialize_arguments<S: Serializer>(
    arguments: &[(String, String)],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(arguments.len()))?;
    for (role, target) in arguments {
        map.serialize_entry(role, target)?;
    }
    map.end()
}

/// Equivalence group. Every row shares the literal id `*`, so each parse
/// synthesizes a unique id for the store; rows are written back as `*`.
#[derive(Debug, Clone, Eq, Serialize)]
pub struct Equiv {
    pub id: String,
    #[serde(rename = "type")]
    pub equiv_type: String,
    pub references: Vec<String>,
}

impl Equiv {
    pub fn new(equiv_type: impl Into<String>, references: Vec<String>) -> Self {
        Self {
            id: Self::fresh_id(),
            equiv_type: equiv_type.into(),
            references,
        }
    }

    /// Synthetic store id: `*` followed by a v4 uuid
    pub fn fresh_id() -> String {
        format!("{}{}", AnnotationKind::Equiv.tag(), Uuid::new_v4().simple())
    }

    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split('\t').collect();
        let [_, info] = fields[..] else {
            return Err(StandoffError::malformed(line, "equiv needs 2 tab-separated fields"));
        };

        let mut parts = info.split_whitespace();
        let equiv_type = parts
            .next()
            .ok_or_else(|| StandoffError::malformed(line, "equiv without type"))?;

        Ok(Self::new(equiv_type, parts.map(str::to_string).collect()))
    }

    pub fn to_row(&self) -> String {
        format!(
            "{}\t{} {}",
            AnnotationKind::Equiv.tag(),
            self.equiv_type,
            self.references.join(" ")
        )
    }
}

impl PartialEq for Equiv {
    fn eq(&self, other: &Self) -> bool {
        self.equiv_type == other.equiv_type && self.references == other.references
    }
}

/// Free-text note attached to another annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id: String,
    #[serde(rename = "type")]
    pub note_type: String,
    pub target: String,
    pub content: String,
}

impl Note {
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().splitn(3, '\t').collect();
        let [id, info, content] = fields[..] else {
            return Err(StandoffError::malformed(line, "note needs 3 tab-separated fields"));
        };

        let parts: Vec<&str> = info.split_whitespace().collect();
        let [note_type, target] = parts[..] else {
            return Err(StandoffError::malformed(line, "note needs type and target"));
        };

        Ok(Self {
            id: id.to_string(),
            note_type: note_type.to_string(),
            target: target.to_string(),
            content: content.to_string(),
        })
    }

    pub fn to_row(&self) -> String {
        format!("{}\t{} {}\t{}", self.id, self.note_type, self.target, self.content)
    }
}

// ============================================================================
// Annotation
// ============================================================================

/// Any supported annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Annotation {
    Entity(Entity),
    Attribute(Attribute),
    Normalization(Normalization),
    Relation(Relation),
    Equiv(Equiv),
    Note(Note),
}

type RowParser = fn(&str) -> Result<Annotation>;

fn entity_row(line: &str) -> Result<Annotation> {
    Entity::parse(line).map(Annotation::Entity)
}

fn attribute_row(line: &str) -> Result<Annotation> {
    Attribute::parse(line).map(Annotation::Attribute)
}

fn normalization_row(line: &str) -> Result<Annotation> {
    Normalization::parse(line).map(Annotation::Normalization)
}

fn relation_row(line: &str) -> Result<Annotation> {
    Relation::parse(line).map(Annotation::Relation)
}

fn equiv_row(line: &str) -> Result<Annotation> {
    Equiv::parse(line).map(Annotation::Equiv)
}

fn note_row(line: &str) -> Result<Annotation> {
    Note::parse(line).map(Annotation::Note)
}

/// Dispatch table keyed by the tag character
const ROW_PARSERS: [(char, RowParser); 6] = [
    ('T', entity_row),
    ('A', attribute_row),
    ('N', normalization_row),
    ('R', relation_row),
    ('#', note_row),
    ('*', equiv_row),
];

impl Annotation {
    /// Parse one annotation row.
    ///
    /// Blank lines and event rows yield `Ok(None)`; unknown tags fail with
    /// [`StandoffError::UnsupportedAnnotation`].
    pub fn parse(line: &str) -> Result<Option<Annotation>> {
        let trimmed = line.trim();
        let Some(tag) = trimmed.chars().next() else {
            return Ok(None);
        };

        if tag == EVENT_TAG {
            return Ok(None);
        }

        let parser = ROW_PARSERS
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, parser)| *parser)
            .ok_or_else(|| StandoffError::UnsupportedAnnotation {
                line: trimmed.to_string(),
            })?;

        parser(trimmed).map(Some)
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Entity(a) => &a.id,
            Self::Attribute(a) => &a.id,
            Self::Normalization(a) => &a.id,
            Self::Relation(a) => &a.id,
            Self::Equiv(a) => &a.id,
            Self::Note(a) => &a.id,
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Entity(_) => AnnotationKind::Entity,
            Self::Attribute(_) => AnnotationKind::Attribute,
            Self::Normalization(_) => AnnotationKind::Normalization,
            Self::Relation(_) => AnnotationKind::Relation,
            Self::Equiv(_) => AnnotationKind::Equiv,
            Self::Note(_) => AnnotationKind::Note,
        }
    }

    pub fn numeric_id(&self) -> Option<u64> {
        numeric_suffix(self.id())
    }

    /// Copy with a replaced id
    pub fn with_id(&self, id: impl Into<String>) -> Annotation {
        let id = id.into();
        let mut copy = self.clone();
        match &mut copy {
            Self::Entity(a) => a.id = id,
            Self::Attribute(a) => a.id = id,
            Self::Normalization(a) => a.id = id,
            Self::Relation(a) => a.id = id,
            Self::Equiv(a) => a.id = id,
            Self::Note(a) => a.id = id,
        }
        copy
    }

    /// Copy whose numeric id part is increased by `delta`.
    ///
    /// Equiv ids have no numeric part and get a fresh synthetic id instead,
    /// so a shifted copy never collides with its source.
    pub fn with_shifted_id(&self, delta: u64) -> Annotation {
        match self {
            Self::Equiv(_) => self.with_id(Equiv::fresh_id()),
            _ => self.with_id(shift_id(self.id(), delta)),
        }
    }

    /// Location in the text, for text-bound annotations
    pub fn span(&self) -> Option<&TextSpan> {
        match self {
            Self::Entity(entity) => Some(&entity.span),
            _ => None,
        }
    }

    /// Ids of the annotations this one points at
    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::Entity(_) => Vec::new(),
            Self::Attribute(a) => vec![a.target.as_str()],
            Self::Normalization(a) => vec![a.target.as_str()],
            Self::Relation(a) => a.arguments.iter().map(|(_, t)| t.as_str()).collect(),
            Self::Equiv(a) => a.references.iter().map(String::as_str).collect(),
            Self::Note(a) => vec![a.target.as_str()],
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            Self::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    /// Serialize back to row form
    pub fn to_row(&self) -> String {
        match self {
            Self::Entity(a) => a.to_row(),
            Self::Attribute(a) => a.to_row(),
            Self::Normalization(a) => a.to_row(),
            Self::Relation(a) => a.to_row(),
            Self::Equiv(a) => a.to_row(),
            Self::Note(a) => a.to_row(),
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(e) => write!(f, "<{}: {}[{}] {}>", e.id, e.entity_type, e.span, e.content),
            Self::Attribute(a) => write!(f, "<{}: {} {}>", a.id, a.name, a.target),
            Self::Normalization(n) => {
                write!(f, "<{}: {}[{}] {}>", n.id, n.resource_id, n.entry_id, n.entry_value)
            }
            Self::Relation(r) => write!(f, "<{}: {} {:?}>", r.id, r.relation_type, r.arguments),
            Self::Equiv(e) => write!(f, "<{}: {} {:?}>", e.id, e.equiv_type, e.references),
            Self::Note(n) => write!(f, "<{}: {} \"{}\">", n.id, n.target, n.content),
        }
    }
}

impl From<Entity> for Annotation {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Relation> for Annotation {
    fn from(relation: Relation) -> Self {
        Self::Relation(relation)
    }
}

// ============================================================================
// Tests
// ============================================================================
