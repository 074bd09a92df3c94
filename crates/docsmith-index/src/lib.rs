//! Documentation section indexing, semantic retrieval, and knowledge graph.
//!
//! Markdown files are split into level-2 sections, optionally enriched with
//! LLM-extracted metadata, embedded in one batch, and stored per repository.
//! Retrieval embeds a change description and ranks files (or single sections)
//! by cosine similarity. The graph links sections to the code entities they
//! describe for structural lookups.

pub mod chunker;
pub(crate) mod corpus;
pub mod enrich;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod memory;
pub mod qdrant;
pub mod retriever;
mod section_prompt;
pub mod similarity;
pub mod sqlite;
pub mod store;

pub use error::{IndexError, Result, StoreError};
