//! Error types for docsmith-index.

use std::num::TryFromIntError;

/// Errors raised by chunk and graph storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Schema migration failure.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Qdrant client error that is neither a connectivity nor a capability problem.
    #[error("Qdrant error: {0}")]
    Qdrant(#[from] Box<qdrant_client::QdrantError>),

    /// The backend cannot be reached.
    #[error("vector store unreachable: {0}")]
    Connection(String),

    /// The backend is reachable but similarity search is not set up on it.
    #[error(
        "vector search unavailable: {0}. Re-run `docsmith index` with [store].qdrant_url configured to create the collection"
    )]
    VectorSearchUnavailable(String),

    /// JSON (de)serialization of stored metadata failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),

    /// A stored row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// A lock guarding in-memory state was poisoned.
    #[error("store lock poisoned: {0}")]
    Lock(String),
}

/// Errors that can occur during indexing, retrieval and graph building.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error walking the corpus.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage backend error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Embedding provider error.
    #[error("LLM error: {0}")]
    Llm(#[from] docsmith_llm::LlmError),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
