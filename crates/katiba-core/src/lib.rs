#![forbid(unsafe_code)]
//! katiba-core library.
//!
//! Articles, queries and prompts, corpus loading, configuration, the error
//! taxonomy, and the [`index::ArticleIndex`] capability every retrieval
//! strategy implements.
//!
//! # Conventions
//!
//! - **Errors**: public functions return [`error::Result`]; internal helpers may
//!   use `anyhow::Result` and convert at the boundary.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod article;
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod lock;
pub mod prompt;

pub use article::{Article, Query};
pub use corpus::Corpus;
pub use error::{ErrorCode, KatibaError, is_timeout};
pub use index::{ArticleIndex, DEFAULT_NUM_RESULTS};
pub use prompt::{LlmResponse, Prompt};
