//! The retrieval capability shared by every search strategy.

use crate::article::{Article, Query};
use crate::error::Result;

/// Number of articles retrieved when the caller does not say otherwise.
pub const DEFAULT_NUM_RESULTS: usize = 5;

/// A retrieval strategy: ranked articles for a query, best first.
///
/// Implementations must return at most `num_results` articles and an empty
/// list when `num_results` is zero.
pub trait ArticleIndex: Send + Sync {
    /// Search for the `num_results` most relevant articles.
    ///
    /// # Errors
    ///
    /// Implementations report storage, embedding and query-parse failures as
    /// the matching [`crate::error::KatibaError`] variant.
    fn search(&self, query: &Query, num_results: usize) -> Result<Vec<Article>>;
}

impl<T: ArticleIndex + ?Sized> ArticleIndex for Box<T> {
    fn search(&self, query: &Query, num_results: usize) -> Result<Vec<Article>> {
        (**self).search(query, num_results)
    }
}

/// Run `query` against any index.
///
/// # Errors
///
/// Propagates the index's error unchanged.
pub fn search(index: &dyn ArticleIndex, query: &Query, num_results: usize) -> Result<Vec<Article>> {
    index.search(query, num_results)
}
