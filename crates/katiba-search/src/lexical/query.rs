//! Free-text query to FTS5 `MATCH` expression.
//!
//! Every distinct content word becomes a quoted phrase and the phrases are
//! joined with `OR`, so an article matches when any of its columns contains
//! any term. Quoting keeps FTS5 operators typed by the user (`AND`, `NEAR`,
//! `*`, `:`) from being interpreted.

use crate::tokenize::query_terms;

/// Build the `MATCH` expression for `text`, or `None` if it has no terms.
#[must_use]
pub fn match_expression(text: &str) -> Option<String> {
    let terms = query_terms(text);
    if terms.is_empty() {
        return None;
    }
    let quoted: Vec<String> = terms.iter().map(|term| quote(term)).collect();
    Some(quoted.join(" OR "))
}

fn quote(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}
