//! Standoff Core - Span algebra, annotation model and document store
//!
//! This crate defines the core abstractions for working with standoff
//! annotations (raw text plus separately stored, offset-addressed records):
//! - Continuous and discontinuous character spans
//! - The closed annotation taxonomy with its line parser and serializer
//! - The per-document annotation store (merge, crop, validation)
//! - Relation-pair rows with distance filtering and negative sampling
//! - Entity-set merge policies
//! - Configuration management

pub mod annotation;
pub mod config;
pub mod document;
pub mod entity_merge;
pub mod relations;
pub mod span;

pub use annotation::{
    Annotation, AnnotationKind, Attribute, AttributeValue, Entity, Equiv, Normalization, Note,
    Relation,
};
pub use config::{
    ConfigError, CorpusConfig, KitConfig, LabelScheme, LabelingConfig, LoggingConfig,
    RelationConfig,
};
pub use document::Document;
pub use entity_merge::{merge_entities, MergeMode, MergePolicy};
pub use relations::{
    span_key, DistanceThreshold, EntityRelations, NegativeSampling, RelationArguments,
    RelationOptions, RelationRow,
};
pub use span::{CharIndex, DiscontinuousSpan, Span, TextSpan};

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for standoff operations
#[derive(Error, Debug)]
pub enum StandoffError {
    #[error("Unsupported annotation: {line}")]
    UnsupportedAnnotation { line: String },

    #[error("Malformed annotation line ({reason}): {line}")]
    MalformedLine { line: String, reason: String },

    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: AnnotationKind, id: String },

    #[error("Documents {left} and {right} do not share the same text")]
    TextMismatch { left: String, right: String },

    #[error(
        "Invalid entity annotation!\n\tDoc: {document}\n\tEntity ID: {entity}\n\tSpan: {span}\
         \n\tContent: \"{expected}\"\n\tIn-document content: \"{actual}\""
    )]
    ContentMismatch {
        document: String,
        entity: String,
        span: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StandoffError {
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StandoffError>;
