//! Embedding and LLM provider abstraction for docsmith.
//!
//! Embedding backends map text to vectors in either document or query mode;
//! chat backends drive structured extraction and drafting.

pub mod any;
pub mod error;
pub mod hashed;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
#[cfg(test)]
mod testing;
pub mod voyage;

pub use error::LlmError;
pub use provider::{EmbedMode, EmbeddingProvider, LlmProvider};
