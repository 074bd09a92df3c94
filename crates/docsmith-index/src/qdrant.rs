//! `Qdrant` mirror of section embeddings for approximate nearest-neighbour search.

use std::collections::HashMap;

use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};

use crate::error::StoreError;
use crate::store::Chunk;

pub const DEFAULT_COLLECTION: &str = "docsmith_sections";

/// Section-level vector index kept in step with the primary chunk store.
///
/// Every sync writes a new generation of points for the repository and then
/// drops the previous generation, so searches never see an empty repository.
#[derive(Clone)]
pub struct SectionVectorIndex {
    client: Qdrant,
    collection: String,
}

impl std::fmt::Debug for SectionVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionVectorIndex")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

/// A chunk id with its similarity to the query, as scored by the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionHit {
    pub chunk_id: i64,
    pub score: f32,
}

impl SectionVectorIndex {
    /// # Errors
    ///
    /// Returns an error if the `Qdrant` client cannot be built from `url`.
    pub fn new(url: &str, collection: impl Into<String>) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self {
            client,
            collection: collection.into(),
        })
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self, vector_size: u64) -> Result<(), StoreError> {
        if self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(classify)?
        {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await
            .map_err(classify)?;

        for field in ["repo_name", "generation"] {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    field,
                    FieldType::Keyword,
                ))
                .await
                .map_err(classify)?;
        }
        tracing::info!(collection = %self.collection, vector_size, "created section collection");
        Ok(())
    }

    /// Mirror the stored chunks of `repo`. Chunks without an id or embedding are skipped.
    ///
    /// Returns the generation id written.
    ///
    /// # Errors
    ///
    /// Returns an error if any `Qdrant` call fails. Points of the previous
    /// generation are only removed after the new ones are written.
    pub async fn sync_repo(&self, repo: &str, chunks: &[Chunk]) -> Result<String, StoreError> {
        let generation = uuid::Uuid::new_v4().to_string();

        let mut points = Vec::new();
        let mut vector_size = None;
        for chunk in chunks {
            let (Some(id), Some(vector)) = (chunk.id, chunk.embedding.as_ref()) else {
                continue;
            };
            vector_size.get_or_insert(vector.len());
            let payload = point_payload(repo, &generation, id, chunk)?;
            points.push(PointStruct::new(
                uuid::Uuid::new_v4().to_string(),
                vector.clone(),
                payload,
            ));
        }

        if let Some(size) = vector_size {
            self.ensure_collection(u64::try_from(size)?).await?;
            let written = points.len();
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
                .await
                .map_err(classify)?;
            tracing::debug!(repo, written, %generation, "mirrored sections");
        } else if !self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(classify)?
        {
            return Ok(generation);
        }

        let stale = Filter {
            must: vec![Condition::matches("repo_name", repo.to_owned())],
            must_not: vec![Condition::matches("generation", generation.clone())],
            ..Default::default()
        };
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(stale)
                    .wait(true),
            )
            .await
            .map_err(classify)?;

        Ok(generation)
    }
}

/// Nearest-neighbour lookup over the stored section vectors of a repository.
pub trait SectionSearch: Send + Sync {
    /// Nearest sections of `repo` to `vector`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be queried.
    fn search(
        &self,
        repo: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> impl Future<Output = Result<Vec<SectionHit>, StoreError>> + Send;
}

impl SectionSearch for SectionVectorIndex {
    /// Fails with [`StoreError::VectorSearchUnavailable`] when the collection
    /// has not been created yet, [`StoreError::Connection`] when the server
    /// cannot be reached.
    async fn search(
        &self,
        repo: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<SectionHit>, StoreError> {
        if !self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(classify)?
        {
            return Err(StoreError::VectorSearchUnavailable(format!(
                "collection `{}` does not exist",
                self.collection
            )));
        }

        let filter = Filter {
            must: vec![Condition::matches("repo_name", repo.to_owned())],
            ..Default::default()
        };
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, limit)
                    .filter(filter)
                    .with_payload(true),
            )
            .await
            .map_err(classify)?;

        Ok(results
            .result
            .iter()
            .filter_map(|point| {
                let chunk_id = point
                    .payload
                    .get("chunk_id")
                    .and_then(qdrant_client::qdrant::Value::as_integer)?;
                Some(SectionHit {
                    chunk_id,
                    score: point.score,
                })
            })
            .collect())
    }
}

fn point_payload(
    repo: &str,
    generation: &str,
    chunk_id: i64,
    chunk: &Chunk,
) -> Result<HashMap<String, qdrant_client::qdrant::Value>, StoreError> {
    Ok(serde_json::from_value(serde_json::json!({
        "repo_name": repo,
        "generation": generation,
        "chunk_id": chunk_id,
        "file_path": chunk.file_path,
        "section_name": chunk.section_name,
        "section_index": chunk.section_index,
        "content_hash": chunk.content_hash,
    }))?)
}

/// Separate "not set up" and "unreachable" from other client failures.
fn classify(err: QdrantError) -> StoreError {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("doesn't exist") {
        StoreError::VectorSearchUnavailable(message)
    } else if lower.contains("transport")
        || lower.contains("connect")
        || lower.contains("unavailable")
        || lower.contains("timed out")
    {
        StoreError::Connection(message)
    } else {
        StoreError::Qdrant(Box::new(err))
    }
}
