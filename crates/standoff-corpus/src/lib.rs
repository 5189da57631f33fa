//! Standoff Corpus - Reading and writing annotated file pairs
//!
//! A corpus is a directory of `{uid}.ann` annotation files, each next to a
//! `{uid}.txt` holding the raw text it addresses. This crate discovers the
//! pairs, parses them into [`Document`](standoff_core::Document)s and writes
//! documents back out in the same layout.

use std::path::PathBuf;

use standoff_core::StandoffError;
use thiserror::Error;

pub mod reader;
pub mod writer;

pub use reader::{CorpusReader, Documents};
pub use writer::save_documents;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while reading or writing a corpus
#[derive(Error, Debug)]
pub enum CorpusError {
    /// Discovery found no annotation files
    #[error("No annotation files found in {root}")]
    NoFiles { root: PathBuf },

    /// A file resolved to a location outside the corpus root
    #[error("{path} is not part of corpus {root}")]
    OutsideCorpus { path: PathBuf, root: PathBuf },

    /// The discovery pattern could not be built
    #[error("Invalid file pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    /// IO error while reading or writing a file
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file pair was read but does not form a valid document
    #[error("Invalid document {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: StandoffError,
    },
}

impl CorpusError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CorpusError>;
