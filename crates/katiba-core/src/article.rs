//! Articles and queries.
//!
//! An [`Article`] is one addressable unit of the constitution. Its `number` is
//! the stable identity used for deduplication and rank fusion; no two articles
//! in a corpus share a number.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One article of the source legal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    /// The operative legal text.
    pub clauses: String,
    pub chapter: String,
    #[serde(default)]
    pub part: Option<String>,
    pub number: u32,
}

impl Article {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        clauses: impl Into<String>,
        chapter: impl Into<String>,
        number: u32,
        part: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            clauses: clauses.into(),
            chapter: chapter.into(),
            part,
            number,
        }
    }
}

/// Canonical string representation: a labeled block used both as embedding
/// input and for display.
impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Chapter: {}", self.chapter)?;
        if let Some(part) = &self.part {
            writeln!(f, "Part: {part}")?;
        }
        writeln!(f, "Title: {}", self.title)?;
        writeln!(f, "Article: {}", self.number)?;
        write!(f, "Clauses:\n{}", self.clauses)
    }
}

/// A free-text question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
}

impl Query {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// True when the query has no non-whitespace characters.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}
