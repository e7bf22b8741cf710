#![forbid(unsafe_code)]
//! katiba-llm library.
//!
//! The generation half of retrieval-augmented answering: a [`Generator`]
//! capability, an OpenAI-compatible chat-completions client, and
//! [`rag::answer`], which retrieves context, fills the prompt and asks the
//! model.
//!
//! # Conventions
//!
//! - **Errors**: Return [`katiba_core::error::Result`]; transport failures
//!   become `Generation` or `Timeout`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod generator;
pub mod openai;
pub mod rag;

pub use generator::{Generator, generate};
pub use openai::{OpenAiCompatibleLlm, format_completions_request};
pub use rag::{Answer, answer};
