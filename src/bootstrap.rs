//! Client construction from [`Config`]. Every command builds its providers
//! and stores here so the core crates never read the environment.

use std::sync::Arc;

use anyhow::Context;
use docsmith_index::indexer::IndexerConfig;
use docsmith_index::qdrant::SectionVectorIndex;
use docsmith_index::retriever::RetrievalConfig;
use docsmith_index::sqlite::SqliteStore;
use docsmith_llm::LlmError;
use docsmith_llm::any::AnyProvider;
use docsmith_llm::hashed::HashedEmbedder;
use docsmith_llm::openai::OpenAiProvider;
use docsmith_llm::voyage::{self, VoyageProvider};

use crate::config::{
    Config, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_EMBEDDING_MODEL, EmbeddingBackend, Secret,
};

fn require_key<'a>(
    secret: Option<&'a Secret>,
    env_key: &'static str,
) -> Result<&'a str, LlmError> {
    secret
        .map(Secret::expose)
        .ok_or(LlmError::MissingCredentials(env_key))
}

/// # Errors
///
/// Returns an error if a remote backend is selected without its API key or
/// the HTTP client cannot be built.
pub fn create_embedder(config: &Config) -> anyhow::Result<AnyProvider> {
    let embedding = &config.embedding;
    match embedding.provider {
        EmbeddingBackend::Voyage => {
            let key = require_key(
                config.secrets.voyage_api_key.as_ref(),
                "DOCSMITH_VOYAGE_API_KEY",
            )?;
            let provider = VoyageProvider::new(
                key.to_owned(),
                embedding
                    .base_url
                    .clone()
                    .unwrap_or_else(|| voyage::DEFAULT_BASE_URL.into()),
                embedding
                    .model
                    .clone()
                    .unwrap_or_else(|| voyage::DEFAULT_MODEL.into()),
            )
            .context("failed to build voyage client")?;
            Ok(AnyProvider::Voyage(provider))
        }
        EmbeddingBackend::OpenAi => {
            let key = require_key(
                config.secrets.openai_api_key.as_ref(),
                "DOCSMITH_OPENAI_API_KEY",
            )?;
            let model = embedding
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING_MODEL.into());
            let provider = OpenAiProvider::new(
                key.to_owned(),
                embedding
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
                model.clone(),
                config.llm.max_tokens,
                Some(model),
            )
            .context("failed to build openai embedding client")?;
            Ok(AnyProvider::OpenAi(provider))
        }
        EmbeddingBackend::Hashed => Ok(AnyProvider::Hashed(HashedEmbedder::new(
            embedding.dimensions,
        ))),
    }
}

/// Chat client for extraction and drafting. `None` when `[llm] enabled = false`.
///
/// # Errors
///
/// Returns an error if the LLM is enabled but `DOCSMITH_LLM_API_KEY` is unset.
pub fn create_llm(config: &Config) -> anyhow::Result<Option<AnyProvider>> {
    if !config.llm.enabled {
        return Ok(None);
    }
    let key = require_key(config.secrets.llm_api_key.as_ref(), "DOCSMITH_LLM_API_KEY")?;
    let provider = OpenAiProvider::new(
        key.to_owned(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.max_tokens,
        None,
    )
    .context("failed to build llm client")?;
    Ok(Some(AnyProvider::OpenAi(provider)))
}

/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::new(&config.store.sqlite_path)
        .await
        .with_context(|| format!("failed to open store at {}", config.store.sqlite_path))?;
    Ok(Arc::new(store))
}

/// # Errors
///
/// Returns an error if `store.qdrant_url` is set but not a valid endpoint.
pub fn create_mirror(config: &Config) -> anyhow::Result<Option<SectionVectorIndex>> {
    config
        .store
        .qdrant_url
        .as_deref()
        .map(|url| {
            SectionVectorIndex::new(url, config.store.collection.clone())
                .with_context(|| format!("invalid qdrant url {url}"))
        })
        .transpose()
}

#[must_use]
pub fn indexer_config(config: &Config) -> IndexerConfig {
    IndexerConfig {
        extensions: config.index.extensions.clone(),
    }
}

#[must_use]
pub fn retrieval_config(config: &Config) -> RetrievalConfig {
    RetrievalConfig {
        query_fallback: config.retrieval.query_fallback,
        fallback_dimensions: config.embedding.dimensions,
    }
}
