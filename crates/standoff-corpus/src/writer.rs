//! Writing documents back out as file pairs

use std::fs;
use std::path::Path;

use standoff_core::{Document, StandoffError};

use crate::{CorpusError, Result};

/// Write each document as `{uid}.txt` / `{uid}.ann` into `output_dir`.
///
/// `output_dir` is emptied first: anything already in it is removed.
/// Returns the number of documents written.
pub fn save_documents<'a, I>(documents: I, output_dir: impl AsRef<Path>) -> Result<usize>
where
    I: IntoIterator<Item = &'a Document>,
{
    let output_dir = output_dir.as_ref();
    if output_dir.exists() {
        tracing::debug!("Clearing output directory {}", output_dir.display());
        fs::remove_dir_all(output_dir).map_err(|e| CorpusError::io(output_dir, e))?;
    }
    fs::create_dir_all(output_dir).map_err(|e| CorpusError::io(output_dir, e))?;

    let mut written = 0;
    for doc in documents {
        let target = output_dir.join(&doc.uid);
        doc.save(&target).map_err(|e| match e {
            StandoffError::Io { path, source } => CorpusError::Io { path, source },
            source => CorpusError::Document { path: target.clone(), source },
        })?;
        written += 1;
    }

    tracing::info!("Saved {} documents to {}", written, output_dir.display());
    Ok(written)
}
