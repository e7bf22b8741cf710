//! Retrieval-augmented answering.

use crate::generator::Generator;
use katiba_core::article::{Article, Query};
use katiba_core::error::Result;
use katiba_core::index::ArticleIndex;
use katiba_core::prompt::{LlmResponse, Prompt};
use serde::Serialize;
use std::fmt;
use tracing::{info, instrument};

/// Shown under every generated answer.
pub const AI_NOTICE: &str = "The above is AI-generated content. Please verify critical facts.";

/// A model answer and the articles it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub response: LlmResponse,
    pub references: Vec<Article>,
}

impl Answer {
    /// Titles of the referenced articles, one per line.
    #[must_use]
    pub fn reference_titles(&self) -> String {
        self.references
            .iter()
            .map(|article| article.title.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Response text, the AI notice, then the reference titles.
impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.response.text.trim_end())?;
        writeln!(f)?;
        writeln!(f, "{AI_NOTICE}")?;
        writeln!(f)?;
        writeln!(f, "Context:")?;
        write!(f, "{}", self.reference_titles())
    }
}

/// Retrieve `num_results` articles for `query`, fill `template` and ask `llm`.
///
/// # Errors
///
/// Returns the retrieval error if search fails, or the generator's error.
#[instrument(skip(index, llm, template))]
pub fn answer(
    index: &dyn ArticleIndex,
    llm: &dyn Generator,
    template: &str,
    query: &Query,
    num_results: usize,
) -> Result<Answer> {
    let references = index.search(query, num_results)?;
    info!(references = references.len(), "retrieved context");

    let prompt = Prompt::new(template, query.clone(), references);
    let response = llm.generate(&prompt)?;

    Ok(Answer {
        response,
        references: prompt.context,
    })
}
