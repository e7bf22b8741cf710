//! Reciprocal Rank Fusion over ranked article lists.
//!
//! ```text
//! RRF score = sum over all lists of: 1 / (k + rank_in_list)
//! ```
//!
//! - `rank` is 1-based; articles absent from a list contribute 0.
//! - Articles are identified by `number`; the first occurrence's record is
//!   the one returned.
//! - Equal scores keep first-appearance order (earlier list, then earlier
//!   position), so fusion is deterministic.
//!
//! With `A = [1, 2, 3]` and `B = [2, 3]` the fused order is `[2, 3, 1]`.

use katiba_core::article::Article;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Smoothing constant from Cormack et al. (2009).
pub const DEFAULT_RRF_K: usize = 60;

/// One deduplicated article with its fused score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedArticle {
    pub article: Article,
    pub score: f64,
    /// 1-based rank in each input list, `None` where absent.
    pub ranks: Vec<Option<usize>>,
}

/// Contribution of a single 1-based `rank`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rrf_score(rank: usize, k: usize) -> f64 {
    1.0 / (k + rank) as f64
}

/// Fuse `lists` into one deduplicated list, best first.
#[must_use]
pub fn rrf_fuse(lists: &[&[Article]], k: usize) -> Vec<FusedArticle> {
    let mut fused: Vec<FusedArticle> = Vec::new();
    let mut slot_by_number: HashMap<u32, usize> = HashMap::new();

    for (list_idx, list) in lists.iter().enumerate() {
        for (idx, article) in list.iter().enumerate() {
            let rank = idx + 1;
            let slot = *slot_by_number.entry(article.number).or_insert_with(|| {
                fused.push(FusedArticle {
                    article: article.clone(),
                    score: 0.0,
                    ranks: vec![None; lists.len()],
                });
                fused.len() - 1
            });

            let entry = &mut fused[slot];
            entry.score += rrf_score(rank, k);
            entry.ranks[list_idx].get_or_insert(rank);
        }
    }

    // Stable: ties stay in first-appearance order.
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    fused
}

/// The fused ordering without scores.
#[must_use]
pub fn rank_results(lists: &[&[Article]], k: usize) -> Vec<Article> {
    rrf_fuse(lists, k)
        .into_iter()
        .map(|fused| fused.article)
        .collect()
}
