//! Prompt composition for the generation step.

use crate::article::{Article, Query};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot replaced with the raw question text.
pub const QUERY_SLOT: &str = "{query}";
/// Slot replaced with the rendered context articles.
pub const CONTEXT_SLOT: &str = "{context}";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "
You are an expert in kenyan legal and constitutional affairs.
Answer the `QUESTION` based on the provided `CONTEXT`.
Use only facts from the `CONTEXT` when answering the `QUESTION`.
The `CONTEXT` contains the relevant articles from the Kenya 2010 constitution.

# QUESTION
{query}

# CONTEXT
{context}
";

/// A template filled with a query and its retrieved context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub template: String,
    pub query: Query,
    pub context: Vec<Article>,
}

impl Prompt {
    #[must_use]
    pub fn new(template: impl Into<String>, query: Query, context: Vec<Article>) -> Self {
        Self {
            template: template.into(),
            query,
            context,
        }
    }

    /// Context articles as labeled blocks joined by blank lines.
    #[must_use]
    pub fn render_context(&self) -> String {
        self.context
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Substituted text is never rescanned, so a query containing
        // "{context}" stays literal.
        let context = self.render_context();
        for (idx, piece) in self.template.split(CONTEXT_SLOT).enumerate() {
            if idx > 0 {
                f.write_str(&context)?;
            }
            for (jdx, chunk) in piece.split(QUERY_SLOT).enumerate() {
                if jdx > 0 {
                    f.write_str(&self.query.text)?;
                }
                f.write_str(chunk)?;
            }
        }
        Ok(())
    }
}

/// Text returned by the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
}

impl LlmResponse {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl fmt::Display for LlmResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
