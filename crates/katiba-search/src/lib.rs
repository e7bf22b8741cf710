#![forbid(unsafe_code)]
//! katiba-search library.
//!
//! Retrieval over constitution articles:
//!
//! - [`lexical::LexicalIndex`]: SQLite FTS5 with BM25 ranking
//! - [`semantic::SemanticIndex`]: embeddings with cosine KNN
//! - [`fusion::HybridIndex`]: both, fused with Reciprocal Rank Fusion
//!
//! Each index persists to its own directory through [`store`], which builds
//! on first use and publishes atomically.
//!
//! # Conventions
//!
//! - **Errors**: public entry points return [`katiba_core::error::Result`];
//!   internals use `anyhow::Result` with context and convert at the boundary.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod fusion;
pub mod lexical;
pub mod semantic;
pub mod store;
pub mod tokenize;

pub use fusion::{HybridHit, HybridIndex, HybridOptions};
pub use lexical::LexicalIndex;
pub use semantic::{ApiEmbedder, Embedder, HashEmbedder, SemanticIndex, build_embedder};
#[cfg(feature = "semantic-ort")]
pub use semantic::OrtEmbedder;
pub use store::{IndexKind, IndexLocation, IndexMeta, IndexStatus, StoreOptions};
