//! Corpus discovery and document reading

use std::fs;
use std::path::{Path, PathBuf};

use standoff_core::{CorpusConfig, Document};

use crate::{CorpusError, Result};

const ANNOTATION_EXTENSION: &str = "ann";
const TEXT_EXTENSION: &str = "txt";

/// Reads `{uid}.ann` / `{uid}.txt` pairs below a root directory
#[derive(Debug, Clone)]
pub struct CorpusReader {
    root: PathBuf,
    recursive: bool,
    skip_errors: bool,
}

impl CorpusReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
            skip_errors: false,
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &CorpusConfig) -> Self {
        Self::new(root)
            .recursive(config.recursive)
            .skip_errors(config.skip_errors)
    }

    /// Also look in sub-directories
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Log and skip documents that fail to read instead of failing
    pub fn skip_errors(mut self, skip_errors: bool) -> Self {
        self.skip_errors = skip_errors;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Annotation files of the corpus, sorted by path
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let root = self.root.to_string_lossy();
        let matcher = if self.recursive { "**/*.ann" } else { "*.ann" };
        let pattern = format!("{}/{}", glob::Pattern::escape(&root), matcher);

        let paths = glob::glob(&pattern).map_err(|e| CorpusError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                CorpusError::io(path, e.into_error())
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(CorpusError::NoFiles {
                root: self.root.clone(),
            });
        }

        tracing::debug!("Found {} annotation files in {}", files.len(), self.root.display());
        Ok(files)
    }

    /// Read the document of one annotation file and its text twin.
    ///
    /// The uid is the file stem.
    pub fn read_document(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        self.check_inside(path)?;

        let uid = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text_path = path.with_extension(TEXT_EXTENSION);

        let annotations = fs::read_to_string(path).map_err(|e| CorpusError::io(path, e))?;
        let text = fs::read_to_string(&text_path).map_err(|e| CorpusError::io(&text_path, e))?;

        Document::parse(uid, text, annotations.lines()).map_err(|source| CorpusError::Document {
            path: path.to_path_buf(),
            source,
        })
    }

    fn check_inside(&self, path: &Path) -> Result<()> {
        let root = self
            .root
            .canonicalize()
            .map_err(|e| CorpusError::io(&self.root, e))?;
        let resolved = path.canonicalize().map_err(|e| CorpusError::io(path, e))?;

        let inside = if self.recursive {
            resolved.starts_with(&root)
        } else {
            resolved.parent() == Some(root.as_path())
        };
        if !inside || resolved.extension().map_or(true, |ext| ext != ANNOTATION_EXTENSION) {
            return Err(CorpusError::OutsideCorpus {
                path: path.to_path_buf(),
                root: self.root.clone(),
            });
        }
        Ok(())
    }

    fn read_or_skip(&self, path: &Path) -> Option<Result<Document>> {
        match self.read_document(path) {
            Ok(doc) => Some(Ok(doc)),
            Err(e) if self.skip_errors => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                None
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// Documents in path order, read one at a time.
    ///
    /// Each call starts a fresh pass over the files.
    pub fn iter_documents(&self) -> Result<Documents<'_>> {
        Ok(Documents {
            reader: self,
            files: self.files()?.into_iter(),
        })
    }

    /// Every document of the corpus
    pub fn documents(&self) -> Result<Vec<Document>> {
        self.iter_documents()?.collect()
    }

    /// Check entity contents against the text of every document.
    /// Returns the number of documents checked.
    pub fn validate(&self, strip_content: bool) -> Result<usize> {
        let mut checked = 0;
        for (path, doc) in self.iter_documents()?.with_paths() {
            let doc = doc?;
            doc.validate_entities(strip_content)
                .map_err(|source| CorpusError::Document { path, source })?;
            checked += 1;
        }
        tracing::info!("Validated {} documents in {}", checked, self.root.display());
        Ok(checked)
    }
}

/// Lazy pass over the documents of a [`CorpusReader`]
pub struct Documents<'a> {
    reader: &'a CorpusReader,
    files: std::vec::IntoIter<PathBuf>,
}

impl<'a> Documents<'a> {
    /// Number of files not yet read
    pub fn remaining(&self) -> usize {
        self.files.len()
    }

    /// Pair each document with the annotation file it came from
    pub fn with_paths(self) -> impl Iterator<Item = (PathBuf, Result<Document>)> + 'a {
        let reader = self.reader;
        self.files.filter_map(move |path| {
            let doc = reader.read_or_skip(&path)?;
            Some((path, doc))
        })
    }
}

impl Iterator for Documents<'_> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        for path in self.files.by_ref() {
            if let Some(doc) = self.reader.read_or_skip(&path) {
                return Some(doc);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.files.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_pair(dir: &Path, uid: &str, text: &str, ann: &str) {
        fs::write(dir.join(format!("{uid}.txt")), text).unwrap();
        fs::write(dir.join(format!("{uid}.ann")), ann).unwrap();
    }

    fn corpus() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), "b", "beta text", "T1\tWord 0 4\tbeta\n");
        write_pair(dir.path(), "a", "alpha text", "T1\tWord 0 5\talpha\nT2\tWord 6 10\ttext\n");
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        write_pair(&nested, "c", "gamma", "T1\tWord 0 5\tgamma\n");
        dir
    }

    #[test]
    fn test_files_sorted() {
        let dir = corpus();
        let files = CorpusReader::new(dir.path()).files().unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.ann", "b.ann"]);
    }

    #[test]
    fn test_recursive_files() {
        let dir = corpus();
        let files = CorpusReader::new(dir.path()).recursive(true).files().unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().any(|f| f.ends_with("nested/c.ann")));
    }

    #[test]
    fn test_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = CorpusReader::new(dir.path()).files().unwrap_err();
        assert!(matches!(err, CorpusError::NoFiles { .. }));
    }

    #[test]
    fn test_read_documents() {
        let dir = corpus();
        let docs = CorpusReader::new(dir.path()).documents().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].uid, "a");
        assert_eq!(docs[0].text, "alpha text");
        assert_eq!(docs[0].entities().count(), 2);
        assert_eq!(docs[1].uid, "b");
    }

    #[test]
    fn test_iteration_restarts() {
        let dir = corpus();
        let reader = CorpusReader::new(dir.path());
        let mut first = reader.iter_documents().unwrap();
        assert_eq!(first.remaining(), 2);
        assert_eq!(first.next().unwrap().unwrap().uid, "a");

        let again: Vec<String> = reader
            .iter_documents()
            .unwrap()
            .map(|d| d.unwrap().uid)
            .collect();
        assert_eq!(again, vec!["a", "b"]);
    }

    #[test]
    fn test_errors_propagate_or_skip() {
        let dir = corpus();
        write_pair(dir.path(), "bad", "text", "X1\tnope\n");

        let strict = CorpusReader::new(dir.path()).documents();
        assert!(matches!(strict, Err(CorpusError::Document { .. })));

        let lenient = CorpusReader::new(dir.path()).skip_errors(true).documents().unwrap();
        assert_eq!(lenient.len(), 2);
    }

    #[test]
    fn test_missing_text_file() {
        let dir = corpus();
        fs::write(dir.path().join("orphan.ann"), "T1\tWord 0 1\tx\n").unwrap();
        let err = CorpusReader::new(dir.path())
            .read_document(dir.path().join("orphan.ann"))
            .unwrap_err();
        assert!(matches!(err, CorpusError::Io { .. }));
    }

    #[test]
    fn test_outside_corpus() {
        let dir = corpus();
        let reader = CorpusReader::new(dir.path());
        let nested = dir.path().join("nested").join("c.ann");
        assert!(matches!(
            reader.read_document(&nested),
            Err(CorpusError::OutsideCorpus { .. })
        ));
        assert!(reader.clone().recursive(true).read_document(&nested).is_ok());

        let elsewhere = tempfile::tempdir().unwrap();
        write_pair(elsewhere.path(), "z", "zeta", "");
        assert!(matches!(
            reader.read_document(elsewhere.path().join("z.ann")),
            Err(CorpusError::OutsideCorpus { .. })
        ));
    }

    #[test]
    fn test_validate() {
        let dir = corpus();
        let reader = CorpusReader::new(dir.path());
        assert_eq!(reader.validate(false).unwrap(), 2);

        write_pair(dir.path(), "wrong", "delta", "T1\tWord 0 5\tomega\n");
        assert!(matches!(reader.validate(false), Err(CorpusError::Document { .. })));

        write_pair(dir.path(), "wrong", "delta ", "T1\tWord 0 6\tdelta\n");
        assert!(reader.validate(true).is_ok());
    }

    #[test]
    fn test_from_config() {
        let dir = corpus();
        let config = CorpusConfig {
            recursive: true,
            skip_errors: false,
            strip_content: false,
        };
        let docs = CorpusReader::from_config(dir.path(), &config).documents().unwrap();
        assert_eq!(docs.len(), 3);
    }
}
