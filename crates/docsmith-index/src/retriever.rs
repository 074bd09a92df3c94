//! Query-time scoring of stored sections against a change description.

use std::collections::HashMap;
use std::sync::Arc;

use docsmith_llm::any::AnyProvider;
use docsmith_llm::hashed::{DEFAULT_DIMENSIONS, HashedEmbedder};
use docsmith_llm::{EmbedMode, EmbeddingProvider};

use crate::error::Result;
use crate::qdrant::{SectionSearch, SectionVectorIndex};
use crate::similarity::{cosine_similarity, dimensions_match};
use crate::store::{Chunk, ChunkFilter, ChunkStore};

/// Retrieval configuration.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Embed the query locally when the configured provider fails.
    pub query_fallback: bool,
    /// Width of the local fallback vectors.
    pub fallback_dimensions: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            query_fallback: true,
            fallback_dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

/// A documentation file and the score of its best section.
#[derive(Debug, Clone, PartialEq)]
pub struct FileScore {
    pub file_path: String,
    pub score: f32,
}

/// A single stored section and its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionMatch {
    pub chunk: Chunk,
    pub score: f32,
}

struct QueryVector {
    vector: Vec<f32>,
    /// Produced by the local fallback rather than the configured provider.
    degraded: bool,
}

/// Ranks stored sections of a repository by similarity to a query text.
pub struct Retriever<S, M = SectionVectorIndex> {
    store: Arc<S>,
    embedder: Arc<AnyProvider>,
    mirror: Option<M>,
    config: RetrievalConfig,
}

impl<S: ChunkStore> Retriever<S> {
    #[must_use]
    pub fn new(store: Arc<S>, embedder: Arc<AnyProvider>, config: RetrievalConfig) -> Self {
        Self {
            store,
            embedder,
            mirror: None,
            config,
        }
    }
}

impl<S: ChunkStore, M: SectionSearch> Retriever<S, M> {
    /// Serve [`best_section`](Self::best_section) from a server-side vector index.
    #[must_use]
    pub fn with_mirror<N: SectionSearch>(self, mirror: N) -> Retriever<S, N> {
        Retriever {
            store: self.store,
            embedder: self.embedder,
            mirror: Some(mirror),
            config: self.config,
        }
    }

    async fn embed_query(&self, query: &str) -> Result<QueryVector> {
        match self.embedder.embed(query, EmbedMode::Query).await {
            Ok(vector) => Ok(QueryVector {
                vector,
                degraded: false,
            }),
            Err(e) if self.config.query_fallback => {
                tracing::warn!(
                    provider = self.embedder.embedder_name(),
                    "query embedding failed, using local hashed fallback: {e:#}"
                );
                Ok(QueryVector {
                    vector: HashedEmbedder::new(self.config.fallback_dimensions).embed_sync(query),
                    degraded: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn embedded_chunks(&self, repo: &str) -> Result<Vec<Chunk>> {
        Ok(self.store.find_chunks(repo, &ChunkFilter::embedded()).await?)
    }

    /// Files of `repo` ranked by their best section's similarity to `query`.
    ///
    /// Files scoring below `min_score` are dropped before truncating to
    /// `top_k`. Equal scores keep discovery order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails, or the query cannot be
    /// embedded and the local fallback is disabled.
    pub async fn find_relevant(
        &self,
        query: &str,
        repo: &str,
        top_k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<FileScore>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let chunks = self.embedded_chunks(repo).await?;
        if chunks.is_empty() {
            tracing::debug!(repo, "no embedded sections");
            return Ok(Vec::new());
        }
        let query = self.embed_query(query).await?;
        let scores = score_chunks(&query.vector, &chunks);

        let mut files: Vec<FileScore> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (chunk, score) in chunks.iter().zip(scores) {
            match positions.get(chunk.file_path.as_str()) {
                Some(&pos) => {
                    if score > files[pos].score {
                        files[pos].score = score;
                    }
                }
                None => {
                    positions.insert(&chunk.file_path, files.len());
                    files.push(FileScore {
                        file_path: chunk.file_path.clone(),
                        score,
                    });
                }
            }
        }

        files.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(min) = min_score {
            files.retain(|f| f.score >= min);
        }
        files.truncate(top_k);
        tracing::debug!(repo, results = files.len(), degraded = query.degraded, "ranked files");
        Ok(files)
    }

    /// Sections of `repo` ranked by exact cosine similarity, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails, or the query cannot be
    /// embedded and the local fallback is disabled.
    pub async fn rank_sections(
        &self,
        query: &str,
        repo: &str,
        limit: usize,
    ) -> Result<Vec<SectionMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let chunks = self.embedded_chunks(repo).await?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embed_query(query).await?;
        Ok(rank(&query.vector, chunks, limit))
    }

    /// The single section of `repo` most similar to `query`.
    ///
    /// Uses the vector index when one is configured and the query was embedded
    /// by the configured provider. Scans all stored sections otherwise, and
    /// also when the index fails, has no hit, or points at a section the store
    /// no longer holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails, or the query cannot be embedded
    /// and the local fallback is disabled.
    pub async fn best_section(&self, query: &str, repo: &str) -> Result<Option<SectionMatch>> {
        let query = self.embed_query(query).await?;

        if let Some(mirror) = &self.mirror {
            if query.degraded {
                tracing::debug!("fallback query vector, scanning sections locally");
            } else if let Some(found) = self.mirror_best(mirror, repo, &query.vector).await? {
                return Ok(Some(found));
            }
        }

        let chunks = self.embedded_chunks(repo).await?;
        Ok(rank(&query.vector, chunks, 1).into_iter().next())
    }

    async fn mirror_best(
        &self,
        mirror: &M,
        repo: &str,
        vector: &[f32],
    ) -> Result<Option<SectionMatch>> {
        let hits = match mirror.search(repo, vector.to_vec(), 1).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(repo, "vector index search failed, scanning sections locally: {e:#}");
                return Ok(None);
            }
        };
        let Some(hit) = hits.first() else {
            tracing::debug!(repo, "vector index has no sections, scanning locally");
            return Ok(None);
        };
        let chunk = self
            .store
            .chunks_by_ids(&[hit.chunk_id])
            .await?
            .into_iter()
            .next();
        let Some(chunk) = chunk else {
            tracing::warn!(
                repo,
                chunk_id = hit.chunk_id,
                "vector index points at a missing section, scanning sections locally"
            );
            return Ok(None);
        };
        Ok(Some(SectionMatch {
            chunk,
            score: hit.score,
        }))
    }
}

fn score_chunks(query: &[f32], chunks: &[Chunk]) -> Vec<f32> {
    let mut mismatched = 0usize;
    let scores = chunks
        .iter()
        .map(|chunk| {
            let embedding = chunk.embedding.as_deref().unwrap_or_default();
            if !dimensions_match(query, embedding) {
                mismatched += 1;
            }
            cosine_similarity(query, embedding)
        })
        .collect();
    if mismatched > 0 {
        tracing::warn!(
            query_dimensions = query.len(),
            mismatched,
            "embedding dimensions differ from the query; comparing truncated vectors"
        );
    }
    scores
}

fn rank(query: &[f32], chunks: Vec<Chunk>, limit: usize) -> Vec<SectionMatch> {
    let scores = score_chunks(query, &chunks);
    let mut matches: Vec<SectionMatch> = chunks
        .into_iter()
        .zip(scores)
        .map(|(chunk, score)| SectionMatch { chunk, score })
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(limit);
    matches
}
