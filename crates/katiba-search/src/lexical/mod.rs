//! Lexical retrieval: SQLite FTS5 with BM25 ranking.
//!
//! - [`fts`]: table layout, population and the BM25 query
//! - [`query`]: free text to a quoted `OR` match expression

pub mod fts;
pub mod query;

use crate::store::{BuildInputs, IndexKind, IndexLocation, StoreOptions};
use katiba_core::article::{Article, Query};
use katiba_core::corpus::Corpus;
use katiba_core::error::{KatibaError, Result};
use katiba_core::index::ArticleIndex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, instrument};

/// Keyword search over title, clauses, chapter and part.
#[derive(Debug)]
pub struct LexicalIndex {
    conn: Mutex<Connection>,
    location: PathBuf,
}

impl LexicalIndex {
    /// Open the lexical index at `dir`, building it from `corpus` if the
    /// location is empty or stale.
    ///
    /// # Errors
    ///
    /// Returns [`KatibaError::IndexUnavailable`] if the location is corrupt or
    /// the build fails, and [`KatibaError::Timeout`] if another build holds
    /// the location for longer than `options.lock_timeout`.
    pub fn open_or_build(dir: &Path, corpus: &Corpus, options: &StoreOptions) -> Result<Self> {
        let location = IndexLocation::new(dir);
        let inputs = BuildInputs {
            kind: IndexKind::Lexical,
            corpus,
            embedder: None,
        };
        let conn = location.open_or_build(&inputs, options, |tx| {
            fts::create_and_populate(tx, corpus.articles())
        })?;
        Ok(Self::from_connection(conn, dir))
    }

    /// Wrap an already-populated connection.
    #[must_use]
    pub fn from_connection(conn: Connection, location: &Path) -> Self {
        Self {
            conn: Mutex::new(conn),
            location: location.to_path_buf(),
        }
    }

    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    fn map_search_error(&self, query: &Query, err: anyhow::Error) -> KatibaError {
        match err.downcast_ref::<rusqlite::Error>() {
            Some(sqlite) if is_query_syntax_error(sqlite) => KatibaError::QueryParse {
                query: query.text.clone(),
                reason: sqlite.to_string(),
            },
            _ => KatibaError::index_unavailable(&self.location, &err),
        }
    }
}

impl ArticleIndex for LexicalIndex {
    #[instrument(skip(self), fields(index = "lexical"))]
    fn search(&self, query: &Query, num_results: usize) -> Result<Vec<Article>> {
        if num_results == 0 {
            return Ok(Vec::new());
        }
        let Some(expression) = query::match_expression(&query.text) else {
            debug!("query has no searchable terms");
            return Ok(Vec::new());
        };

        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let hits = fts::search_bm25(&conn, &expression, num_results)
            .map_err(|err| self.map_search_error(query, err))?;
        debug!(hits = hits.len(), %expression, "lexical search complete");
        Ok(hits)
    }
}

fn is_query_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            message.contains("fts5: syntax error")
                || message.contains("unterminated string")
                || message.contains("no such column")
        }
        _ => false,
    }
}
