//! Rank fusion and the hybrid index built on it.

pub mod hybrid;
pub mod rrf;

pub use hybrid::{HybridHit, HybridIndex, HybridOptions};
pub use rrf::{DEFAULT_RRF_K, FusedArticle, rank_results, rrf_fuse, rrf_score};
