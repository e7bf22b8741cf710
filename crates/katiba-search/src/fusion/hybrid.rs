//! Hybrid retrieval: lexical and semantic searches fused with RRF.
//!
//! Both sub-searches run concurrently on scoped threads with the same query
//! and candidate pool size. Either failing fails the whole search; there is
//! no lexical-only fallback, so a broken semantic index is noticed.

use super::rrf::{DEFAULT_RRF_K, rrf_fuse};
use crate::lexical::LexicalIndex;
use crate::semantic::{Embedder, SemanticIndex};
use crate::store::StoreOptions;
use katiba_core::article::{Article, Query};
use katiba_core::config::SearchConfig;
use katiba_core::corpus::Corpus;
use katiba_core::error::Result;
use katiba_core::index::ArticleIndex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Tuning knobs for [`HybridIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridOptions {
    pub rrf_k: usize,
    /// Each sub-search fetches `num_results * candidate_pool_factor`
    /// candidates before fusion. 1 fetches exactly `num_results`.
    pub candidate_pool_factor: usize,
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            candidate_pool_factor: 1,
        }
    }
}

impl From<&SearchConfig> for HybridOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            rrf_k: config.rrf_k,
            candidate_pool_factor: config.candidate_pool_factor,
        }
    }
}

/// A fused result with its per-index explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridHit {
    pub article: Article,
    pub score: f64,
    /// 1-based rank in the lexical results, if present.
    pub lexical_rank: Option<usize>,
    /// 1-based rank in the semantic results, if present.
    pub semantic_rank: Option<usize>,
}

/// Combines a lexical and a semantic index.
pub struct HybridIndex {
    lexical: Box<dyn ArticleIndex>,
    semantic: Box<dyn ArticleIndex>,
    options: HybridOptions,
}

impl std::fmt::Debug for HybridIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridIndex")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl HybridIndex {
    #[must_use]
    pub fn new(lexical: Box<dyn ArticleIndex>, semantic: Box<dyn ArticleIndex>) -> Self {
        Self::with_options(lexical, semantic, HybridOptions::default())
    }

    #[must_use]
    pub fn with_options(
        lexical: Box<dyn ArticleIndex>,
        semantic: Box<dyn ArticleIndex>,
        options: HybridOptions,
    ) -> Self {
        Self {
            lexical,
            semantic,
            options,
        }
    }

    /// Open (building where needed) both sub-indexes from their locations.
    ///
    /// # Errors
    ///
    /// Propagates the first failure from [`LexicalIndex::open_or_build`] or
    /// [`SemanticIndex::open_or_build`].
    pub fn from_index_locations(
        lexical_dir: &Path,
        semantic_dir: &Path,
        corpus: &Corpus,
        embedder: Arc<dyn Embedder>,
        store: &StoreOptions,
    ) -> Result<Self> {
        let lexical = LexicalIndex::open_or_build(lexical_dir, corpus, store)?;
        let semantic = SemanticIndex::open_or_build(semantic_dir, corpus, embedder, store)?;
        Ok(Self::new(Box::new(lexical), Box::new(semantic)))
    }

    #[must_use]
    pub const fn options(&self) -> HybridOptions {
        self.options
    }

    /// Fused search that also reports each article's sub-index ranks.
    ///
    /// # Errors
    ///
    /// Returns the lexical error if lexical search fails, otherwise the
    /// semantic error if semantic search fails.
    #[instrument(skip(self), fields(index = "hybrid"))]
    pub fn search_explained(&self, query: &Query, num_results: usize) -> Result<Vec<HybridHit>> {
        if num_results == 0 {
            return Ok(Vec::new());
        }
        let pool = num_results.saturating_mul(self.options.candidate_pool_factor.max(1));

        let span = tracing::Span::current();
        let (lexical, semantic) = std::thread::scope(|scope| {
            let semantic = scope.spawn(|| span.in_scope(|| self.semantic.search(query, pool)));
            let lexical = self.lexical.search(query, pool);
            let semantic = semantic
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (lexical, semantic)
        });
        let lexical = lexical?;
        let semantic = semantic?;
        debug!(
            lexical = lexical.len(),
            semantic = semantic.len(),
            pool,
            "fusing sub-index results"
        );

        let mut fused = rrf_fuse(&[lexical.as_slice(), semantic.as_slice()], self.options.rrf_k);
        fused.truncate(num_results);

        Ok(fused
            .into_iter()
            .map(|hit| HybridHit {
                lexical_rank: hit.ranks.first().copied().flatten(),
                semantic_rank: hit.ranks.get(1).copied().flatten(),
                article: hit.article,
                score: hit.score,
            })
            .collect())
    }
}

impl ArticleIndex for HybridIndex {
    fn search(&self, query: &Query, num_results: usize) -> Result<Vec<Article>> {
        Ok(self
            .search_explained(query, num_results)?
            .into_iter()
            .map(|hit| hit.article)
            .collect())
    }
}
