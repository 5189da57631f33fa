//! Document store
//!
//! A [`Document`] pairs a raw text with its annotations, kept in one
//! id-keyed bucket per [`AnnotationKind`]. Buckets remember insertion order
//! so that every iteration (and therefore relation sampling) is stable.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::annotation::{
    Annotation, AnnotationKind, Attribute, Entity, Equiv, Normalization, Note, Relation,
};
use crate::span::{char_slice, CharIndex, Span};
use crate::{Result, StandoffError};

// ============================================================================
// Bucket
// ============================================================================

/// Id-keyed annotations of one kind, in insertion order
#[derive(Debug, Clone, Default)]
struct Bucket {
    order: Vec<String>,
    items: HashMap<String, Annotation>,
}

impl Bucket {
    fn insert(&mut self, annotation: Annotation) -> bool {
        let id = annotation.id().to_string();
        if self.items.contains_key(&id) {
            return false;
        }
        self.order.push(id.clone());
        self.items.insert(id, annotation);
        true
    }

    fn get(&self, id: &str) -> Option<&Annotation> {
        self.items.get(id)
    }

    fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.items.clear();
    }
}

// ============================================================================
// Document
// ============================================================================

/// A text with its standoff annotations
#[derive(Debug, Clone)]
pub struct Document {
    pub uid: String,
    pub text: String,
    buckets: BTreeMap<AnnotationKind, Bucket>,
}

impl Document {
    /// Create an empty document
    pub fn new(uid: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            text: text.into(),
            buckets: AnnotationKind::ALL
                .into_iter()
                .map(|kind| (kind, Bucket::default()))
                .collect(),
        }
    }

    /// Build a document from annotation rows addressing `text`
    pub fn parse<I, L>(uid: impl Into<String>, text: impl Into<String>, lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let mut doc = Self::new(uid, text);
        for line in lines {
            if let Some(annotation) = Annotation::parse(line.as_ref())? {
                doc.add(annotation)?;
            }
        }
        Ok(doc)
    }

    /// Insert an annotation into its kind's bucket
    pub fn add(&mut self, annotation: impl Into<Annotation>) -> Result<()> {
        let annotation = annotation.into();
        let kind = annotation.kind();
        let id = annotation.id().to_string();

        if !self.buckets.entry(kind).or_default().insert(annotation) {
            return Err(StandoffError::DuplicateId { kind, id });
        }
        Ok(())
    }

    /// Insert a copy whose numeric id part is increased by `delta`
    pub fn add_shifted(&mut self, annotation: &Annotation, delta: u64) -> Result<()> {
        self.add(annotation.with_shifted_id(delta))
    }

    /// Drop every annotation of one kind
    pub fn clean(&mut self, kind: AnnotationKind) {
        if let Some(bucket) = self.buckets.get_mut(&kind) {
            bucket.clear();
        }
    }

    pub fn get(&self, kind: AnnotationKind, id: &str) -> Option<&Annotation> {
        self.buckets.get(&kind).and_then(|bucket| bucket.get(id))
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.get(AnnotationKind::Entity, id)
            .and_then(Annotation::as_entity)
    }

    /// Annotations of one kind in insertion order
    pub fn iter(&self, kind: AnnotationKind) -> impl Iterator<Item = &Annotation> {
        self.buckets.get(&kind).into_iter().flat_map(Bucket::iter)
    }

    /// Every annotation, kind by kind
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.buckets.values().flat_map(Bucket::iter)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.iter(AnnotationKind::Entity).filter_map(Annotation::as_entity)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.iter(AnnotationKind::Relation)
            .filter_map(Annotation::as_relation)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.iter(AnnotationKind::Attribute).filter_map(|a| match a {
            Annotation::Attribute(attribute) => Some(attribute),
            _ => None,
        })
    }

    pub fn normalizations(&self) -> impl Iterator<Item = &Normalization> {
        self.iter(AnnotationKind::Normalization)
            .filter_map(|a| match a {
                Annotation::Normalization(normalization) => Some(normalization),
                _ => None,
            })
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.iter(AnnotationKind::Note).filter_map(|a| match a {
            Annotation::Note(note) => Some(note),
            _ => None,
        })
    }

    pub fn equivs(&self) -> impl Iterator<Item = &Equiv> {
        self.iter(AnnotationKind::Equiv).filter_map(|a| match a {
            Annotation::Equiv(equiv) => Some(equiv),
            _ => None,
        })
    }

    pub fn count(&self, kind: AnnotationKind) -> usize {
        self.buckets.get(&kind).map(Bucket::len).unwrap_or(0)
    }

    /// Total number of annotations
    pub fn len(&self) -> usize {
        self.buckets.values().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest numeric id suffix in one kind, or in all kinds when `kind`
    /// is `None`. Zero when nothing is numbered.
    pub fn highest_id(&self, kind: Option<AnnotationKind>) -> u64 {
        let highest = match kind {
            Some(kind) => self.iter(kind).filter_map(Annotation::numeric_id).max(),
            None => self.annotations().filter_map(Annotation::numeric_id).max(),
        };
        highest.unwrap_or(0)
    }

    /// Combine two annotation layers over the same text.
    ///
    /// `first` is copied verbatim; every id from `second` is renumbered past
    /// the highest id of `first`. References inside `second` keep pointing
    /// at the original ids.
    pub fn from_pair(first: &Document, second: &Document) -> Result<Document> {
        if first.text != second.text {
            return Err(StandoffError::TextMismatch {
                left: first.uid.clone(),
                right: second.uid.clone(),
            });
        }

        let offset = first.highest_id(None);
        let mut merged = Document::new(first.uid.clone(), first.text.clone());

        for kind in AnnotationKind::ALL {
            for annotation in first.iter(kind) {
                merged.add(annotation.clone())?;
            }
            for annotation in second.iter(kind) {
                merged.add_shifted(annotation, offset)?;
            }
        }

        tracing::debug!(
            "Merged {} into {}: {} + {} annotations, second layer shifted by {}",
            second.uid,
            first.uid,
            first.len(),
            second.len(),
            offset
        );

        Ok(merged)
    }

    /// Sub-document covering `span`.
    ///
    /// Entities fully inside `span` are kept and moved to the new origin;
    /// entities outside are dropped. Annotations without a location are
    /// carried over as they are, even if what they reference was dropped.
    pub fn crop(&self, span: Span) -> Document {
        let text = char_slice(&self.text, span.start(), span.end());
        let mut cropped = Document::new(format!("{}_{}", self.uid, span), text);
        let delta = -(span.start() as isize);

        let mut dropped = 0usize;
        for annotation in self.annotations() {
            let kept = match annotation {
                Annotation::Entity(entity) if entity.span.within_span(&span) => {
                    let mut shifted = entity.clone();
                    shifted.span = entity.span.shift(delta);
                    Some(Annotation::Entity(shifted))
                }
                Annotation::Entity(_) => None,
                other => Some(other.clone()),
            };

            match kept {
                Some(annotation) => {
                    if let Err(e) = cropped.add(annotation) {
                        tracing::warn!("Crop of {} lost an annotation: {}", self.uid, e);
                        dropped += 1;
                    }
                }
                None => dropped += 1,
            }
        }

        tracing::debug!(
            "Cropped {} to {}: kept {} annotations, dropped {}",
            self.uid,
            span,
            cropped.len(),
            dropped
        );

        cropped
    }

    /// Every annotation in row form
    pub fn to_rows(&self) -> Vec<String> {
        self.annotations().map(Annotation::to_row).collect()
    }

    /// Write `{path}.txt` and `{path}.ann`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let with_extension = |ext: &str| {
            let mut os = path.as_ref().as_os_str().to_owned();
            os.push(ext);
            PathBuf::from(os)
        };

        let write = |target: PathBuf, contents: String| {
            std::fs::write(&target, contents).map_err(|e| StandoffError::Io {
                path: target,
                source: e,
            })
        };

        write(with_extension(".txt"), self.text.clone())?;
        write(with_extension(".ann"), self.to_rows().join("\n"))
    }

    /// Check that every entity's content matches the text it addresses.
    /// With `strip`, both sides are trimmed before comparing.
    pub fn validate_entities(&self, strip: bool) -> Result<()> {
        let index = CharIndex::new(&self.text);
        for entity in self.entities() {
            let actual = index.span_text(&entity.span);
            let expected = entity.content.replace('\n', " ");

            let (a, e) = if strip {
                (actual.trim(), expected.trim())
            } else {
                (actual.as_str(), expected.as_str())
            };

            if a != e {
                return Err(StandoffError::ContentMismatch {
                    document: self.uid.clone(),
                    entity: entity.id.clone(),
                    span: entity.span.to_string(),
                    expected: entity.content.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Interchange view: `{id, text, annotations: {kind: {id: fields}}}`
    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| StandoffError::Other(e.into()))
    }
}

struct BucketView<'a>(&'a Bucket);

impl Serialize for BucketView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for annotation in self.0.iter() {
            map.serialize_entry(annotation.id(), annotation)?;
        }
        map.end()
    }
}

struct AnnotationsView<'a>(&'a BTreeMap<AnnotationKind, Bucket>);

impl Serialize for AnnotationsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (kind, bucket) in self.0 {
            map.serialize_entry(kind.plural(), &BucketView(bucket))?;
        }
        map.end()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.uid)?;
        map.serialize_entry("text", &self.text)?;
        map.serialize_entry("annotations", &AnnotationsView(&self.buckets))?;
        map.end()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{DiscontinuousSpan, TextSpan};

    const TEXT: &str = "this is a sample document";

    fn entity(id: &str, entity_type: &str, start: usize, end: usize) -> Entity {
        Entity::new(id, entity_type, Span::new(start, end), &TEXT[start..end])
    }

    #[test]
    fn test_parse_document() {
        let lines = [
            "T1\tPerson 10 16\tsample",
            "",
            "T2\tThing 17 25\tdocument",
            "R1\tAbout Arg1:T1 Arg2:T2",
            "E1\tEvent:T1",
            "*\tEquiv T1 T2",
        ];
        let doc = Document::parse("doc", TEXT, lines).unwrap();
        assert_eq!(doc.count(AnnotationKind::Entity), 2);
        assert_eq!(doc.count(AnnotationKind::Relation), 1);
        assert_eq!(doc.count(AnnotationKind::Equiv), 1);
        assert_eq!(doc.len(), 4);
        assert_eq!(doc.entity("T2").unwrap().content, "document");
    }

    #[test]
    fn test_parse_document_unsupported_row() {
        let err = Document::parse("doc", TEXT, ["X1\tfoo"]).unwrap_err();
        assert!(matches!(err, StandoffError::UnsupportedAnnotation { .. }));
    }

    #[test]
    fn test_add_duplicate_id() {
        let mut doc = Document::new("doc", TEXT);
        doc.add(entity("T1", "Person", 10, 16)).unwrap();
        let err = doc.add(entity("T1", "Thing", 17, 25)).unwrap_err();
        assert!(matches!(err, StandoffError::DuplicateId { .. }));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_equivs_coexist() {
        let doc = Document::parse("doc", TEXT, ["*\tEquiv T1 T2", "*\tEquiv T3 T4"]).unwrap();
        assert_eq!(doc.count(AnnotationKind::Equiv), 2);
    }

    #[test]
    fn test_highest_id() {
        let doc = Document::parse(
            "doc",
            TEXT,
            ["T3\tPerson 10 16\tsample", "R7\tX Arg1:T3 Arg2:T3", "*\tEquiv T3"],
        )
        .unwrap();
        assert_eq!(doc.highest_id(Some(AnnotationKind::Entity)), 3);
        assert_eq!(doc.highest_id(None), 7);
        assert_eq!(doc.highest_id(Some(AnnotationKind::Note)), 0);
        assert_eq!(Document::new("empty", "").highest_id(None), 0);
    }

    #[test]
    fn test_add_shifted_and_clean() {
        let mut doc = Document::new("doc", TEXT);
        let ann: Annotation = entity("T1", "Person", 10, 16).into();
        doc.add(ann.clone()).unwrap();
        doc.add_shifted(&ann, 4).unwrap();
        assert!(doc.entity("T5").is_some());

        doc.clean(AnnotationKind::Entity);
        assert!(doc.is_empty());
    }

    #[test]
    fn test_from_pair() {
        let mut d1 = Document::new("test", TEXT);
        d1.add(entity("T102", "Person", 10, 16)).unwrap();

        let mut d2 = Document::new("test", TEXT);
        d2.add(entity("T1", "Company", 17, 25)).unwrap();

        let merged = Document::from_pair(&d1, &d2).unwrap();
        assert_eq!(merged.text, TEXT);
        assert_eq!(merged.count(AnnotationKind::Entity), 2);
        assert_eq!(merged.entity("T102"), d1.entity("T102"));
        assert_eq!(merged.entity("T103").unwrap().span, d2.entity("T1").unwrap().span);
        assert_eq!(merged.entity("T103").unwrap().content, "document");
    }

    #[test]
    fn test_from_pair_with_shared_equivs() {
        let lines = [
            "T1\tPerson 10 16\tsample",
            "T2\tThing 17 25\tdocument",
            "*\tEquiv T1 T2",
        ];
        let doc = Document::parse("test", TEXT, lines).unwrap();

        let merged = Document::from_pair(&doc, &doc.clone()).unwrap();
        assert_eq!(merged.count(AnnotationKind::Entity), 4);
        assert_eq!(merged.count(AnnotationKind::Equiv), 2);
        assert!(merged.entity("T4").is_some());

        // a merged document paired with one of its inputs
        let again = Document::from_pair(&merged, &doc).unwrap();
        assert_eq!(again.count(AnnotationKind::Equiv), 3);
    }

    #[test]
    fn test_from_pair_text_mismatch() {
        let d1 = Document::new("a", TEXT);
        let d2 = Document::new("b", "another text");
        let err = Document::from_pair(&d1, &d2).unwrap_err();
        assert!(matches!(err, StandoffError::TextMismatch { .. }));
    }

    #[test]
    fn test_crop() {
        let mut doc = Document::new("doc", TEXT);
        doc.add(entity("T1", "Person", 10, 16)).unwrap();
        doc.add(entity("T2", "Thing", 17, 25)).unwrap();
        doc.add(Relation::new(
            "R1",
            "About",
            vec![("Arg1".into(), "T1".into()), ("Arg2".into(), "T2".into())],
        ))
        .unwrap();

        let cropped = doc.crop(Span::new(0, 20));
        assert_eq!(cropped.text, "this is a sample doc");
        assert_eq!(cropped.uid, "doc_0-20");
        assert_eq!(cropped.count(AnnotationKind::Entity), 1);
        assert_eq!(
            cropped.entity("T1").unwrap().span,
            TextSpan::Continuous(Span::new(10, 16))
        );
        // references are not repaired
        assert_eq!(cropped.count(AnnotationKind::Relation), 1);

        let shifted = doc.crop(Span::new(8, 25));
        assert_eq!(
            shifted.entity("T2").unwrap().span,
            TextSpan::Continuous(Span::new(9, 17))
        );
        shifted.validate_entities(false).unwrap();
    }

    #[test]
    fn test_validate_entities() {
        let mut doc = Document::new("doc", TEXT);
        doc.add(entity("T1", "Person", 10, 16)).unwrap();
        doc.validate_entities(false).unwrap();

        doc.add(Entity::new("T2", "Thing", Span::new(16, 25), "document "))
            .unwrap();
        let err = doc.validate_entities(false).unwrap_err();
        match err {
            StandoffError::ContentMismatch {
                document,
                entity,
                actual,
                ..
            } => {
                assert_eq!(document, "doc");
                assert_eq!(entity, "T2");
                assert_eq!(actual, " document");
            }
            other => panic!("unexpected error: {other}"),
        }
        doc.validate_entities(true).unwrap();
    }

    #[test]
    fn test_validate_multiline_entity() {
        let text = "aaaaaaaaa foo\nbar";
        let doc = Document::parse("doc", text, ["T1\tX 10 17\tfoo\nbar"]).unwrap();
        let span = &doc.entity("T1").unwrap().span;
        assert_eq!(
            span,
            &TextSpan::Discontinuous(
                DiscontinuousSpan::new([Span::new(10, 13), Span::new(14, 17)]).unwrap()
            )
        );
        doc.validate_entities(false).unwrap();
    }

    #[test]
    fn test_to_rows_and_json() {
        let lines = ["T1\tPerson 10 16\tsample", "A1\tNegated T1"];
        let doc = Document::parse("doc", TEXT, lines).unwrap();
        assert_eq!(doc.to_rows(), lines);

        let json = doc.to_json().unwrap();
        assert_eq!(json["id"], "doc");
        assert_eq!(json["annotations"]["entities"]["T1"]["span"], serde_json::json!([10, 16]));
        assert_eq!(json["annotations"]["entities"]["T1"]["type"], "Person");
        assert_eq!(json["annotations"]["attributes"]["A1"]["value"], true);
        assert!(json["annotations"]["notes"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_save() {
        let dir = tempfile::tempdir().unwrap();
        let doc = Document::parse("doc", TEXT, ["T1\tPerson 10 16\tsample"]).unwrap();
        doc.save(dir.path().join("doc")).unwrap();

        let text = std::fs::read_to_string(dir.path().join("doc.txt")).unwrap();
        let rows = std::fs::read_to_string(dir.path().join("doc.ann")).unwrap();
        assert_eq!(text, TEXT);
        assert_eq!(rows, "T1\tPerson 10 16\tsample");
    }
}
