//! Static article corpus loading.
//!
//! The corpus is a JSON array of article records read once at index-build
//! time. Its BLAKE3 fingerprint is recorded alongside built indexes so a
//! changed corpus invalidates them.

use crate::article::Article;
use crate::error::{KatibaError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A validated, ordered set of articles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    path: PathBuf,
    fingerprint: String,
    articles: Vec<Article>,
}

impl Corpus {
    /// Read and validate the corpus file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KatibaError::Corpus`] if the file cannot be read, is not a
    /// JSON array of articles, or repeats an article number.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|err| KatibaError::Corpus {
            path: path.to_path_buf(),
            reason: format!("read failed: {err}"),
        })?;
        Self::from_json_bytes(path, &bytes)
    }

    /// Parse corpus JSON that has already been read from `path`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Corpus::load`], minus I/O.
    pub fn from_json_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let articles: Vec<Article> =
            serde_json::from_slice(bytes).map_err(|err| KatibaError::Corpus {
                path: path.to_path_buf(),
                reason: format!("invalid article JSON: {err}"),
            })?;

        let mut seen = HashSet::with_capacity(articles.len());
        for article in &articles {
            if !seen.insert(article.number) {
                return Err(KatibaError::Corpus {
                    path: path.to_path_buf(),
                    reason: format!("article number {} appears more than once", article.number),
                });
            }
        }

        let fingerprint = blake3::hash(bytes).to_hex().to_string();
        debug!(
            path = %path.display(),
            articles = articles.len(),
            %fingerprint,
            "loaded article corpus"
        );

        Ok(Self {
            path: path.to_path_buf(),
            fingerprint,
            articles,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// BLAKE3 hex digest of the corpus source bytes.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    const TWO_ARTICLES: &str = r#"[
        {"title": "Sovereignty of the people", "clauses": "(1) All sovereign power belongs to the people of Kenya.", "chapter": "Chapter One", "part": null, "number": 1},
        {"title": "Supremacy of this Constitution", "clauses": "(1) This Constitution is the supreme law of the Republic.", "chapter": "Chapter One", "number": 2}
    ]"#;

    #[test]
    fn loads_articles_in_source_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("articles.json");
        std::fs::write(&path, TWO_ARTICLES).expect("write corpus");

        let corpus = Corpus::load(&path).expect("corpus should load");
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.articles()[0].number, 1);
        assert_eq!(corpus.articles()[1].number, 2);
        assert_eq!(corpus.path(), path.as_path());
        assert_eq!(corpus.fingerprint().len(), 64);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = Corpus::from_json_bytes(Path::new("a.json"), TWO_ARTICLES.as_bytes())
            .expect("parse");
        let b = Corpus::from_json_bytes(Path::new("b.json"), TWO_ARTICLES.as_bytes())
            .expect("parse");
        let c = Corpus::from_json_bytes(Path::new("c.json"), b"[]").expect("parse");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert!(c.is_empty());
    }

    #[test]
    fn duplicate_numbers_are_rejected() {
        let json = r#"[
            {"title": "a", "clauses": "x", "chapter": "c", "number": 4},
            {"title": "b", "clauses": "y", "chapter": "c", "number": 4}
        ]"#;
        let err = Corpus::from_json_bytes(Path::new("dup.json"), json.as_bytes())
            .expect_err("duplicate numbers must fail");
        assert_eq!(err.code(), ErrorCode::CorpusInvalid);
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = Corpus::from_json_bytes(Path::new("bad.json"), b"{not json")
            .expect_err("malformed JSON must fail");
        assert_eq!(err.code(), ErrorCode::CorpusInvalid);
    }

    #[test]
    fn missing_file_is_a_corpus_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Corpus::load(&dir.path().join("nope.json")).expect_err("missing file");
        assert!(err.to_string().contains("read failed"));
    }
}
