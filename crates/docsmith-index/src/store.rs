//! Record types and storage traits for indexed sections and the knowledge graph.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// One indexed documentation section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Assigned by the store on insert; `None` for records not yet stored.
    pub id: Option<i64>,
    pub repo_name: String,
    pub file_path: String,
    pub section_name: String,
    pub section_index: usize,
    pub content: String,
    /// Text the embedding was computed from, when it differs from `content`.
    pub enriched_text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    /// blake3 hex digest of `content`.
    pub content_hash: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// The text that was (or would be) embedded for this chunk.
    #[must_use]
    pub fn embedding_text(&self) -> &str {
        self.enriched_text.as_deref().unwrap_or(&self.content)
    }
}

/// Free-form bag stored next to each chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// 1-based line of the document where the section starts.
    #[serde(default)]
    pub line_start: usize,
    /// Number of sections in the owning file.
    #[serde(default)]
    pub sections_in_file: usize,
}

/// Restricts which chunks [`ChunkStore::find_chunks`] returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkFilter {
    pub file_path: Option<String>,
    pub with_embedding_only: bool,
}

impl ChunkFilter {
    /// Chunks that carry an embedding, in any file.
    #[must_use]
    pub fn embedded() -> Self {
        Self {
            file_path: None,
            with_embedding_only: true,
        }
    }

    #[must_use]
    pub fn in_file(file_path: impl Into<String>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            with_embedding_only: false,
        }
    }

    pub(crate) fn matches(&self, chunk: &Chunk) -> bool {
        if self.with_embedding_only && chunk.embedding.is_none() {
            return false;
        }
        self.file_path
            .as_deref()
            .is_none_or(|path| path == chunk.file_path)
    }
}

/// Kind of code construct a section can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Function,
    Endpoint,
    Class,
    Variable,
    Dependency,
}

impl EntityType {
    pub const ALL: [Self; 5] = [
        Self::Function,
        Self::Endpoint,
        Self::Class,
        Self::Variable,
        Self::Dependency,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Endpoint => "endpoint",
            Self::Class => "class",
            Self::Variable => "variable",
            Self::Dependency => "dependency",
        }
    }

    /// Relationship type string for "section describes this kind of entity".
    #[must_use]
    pub fn describes_relation(self) -> String {
        format!("section_describes_{}", self.as_str())
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown entity type: {s}")))
    }
}

/// Graph node mirroring one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntity {
    pub id: String,
    pub repo_name: String,
    pub file_path: String,
    pub section_name: String,
    pub section_index: usize,
    pub content: String,
}

/// Deduplicated code construct referenced by one or more sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEntity {
    pub id: String,
    pub repo_name: String,
    pub entity_type: EntityType,
    pub name: String,
    /// Ids of the sections that mention this entity, in discovery order.
    pub related_sections: Vec<String>,
    /// Headers of those sections, without repeats.
    pub extracted_from: Vec<String>,
}

/// Relationship kind linking a section to a code entity it documents.
pub const DESCRIBES: &str = "describes";

/// Directed edge between two graph nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub repo_name: String,
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub relationship_type: String,
    pub kind: String,
}

/// Text lookup row for a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionIndexEntry {
    pub repo_name: String,
    pub section_id: String,
    pub file_path: String,
    pub section_name: String,
    pub searchable_text: String,
}

/// Everything the graph holds for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub sections: Vec<SectionEntity>,
    pub code_entities: Vec<CodeEntity>,
    pub relationships: Vec<Relationship>,
    pub section_index: Vec<SectionIndexEntry>,
}

/// Sections of one file in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutline {
    pub file_path: String,
    pub sections: Vec<SectionEntity>,
}

/// Persistence for [`Chunk`] records, scoped by repository.
pub trait ChunkStore: Send + Sync {
    /// Chunks of `repo` matching `filter`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    fn find_chunks(
        &self,
        repo: &str,
        filter: &ChunkFilter,
    ) -> impl Future<Output = Result<Vec<Chunk>, StoreError>> + Send;

    /// Remove every chunk of `repo`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn delete_chunks(&self, repo: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Append chunks, returning the assigned ids in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn insert_chunks(
        &self,
        chunks: Vec<Chunk>,
    ) -> impl Future<Output = Result<Vec<i64>, StoreError>> + Send;

    /// Atomically swap the chunk set of `repo` for `chunks`.
    ///
    /// Readers observe either the old set or the new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails; the old set is then kept.
    fn replace_chunks(
        &self,
        repo: &str,
        chunks: Vec<Chunk>,
    ) -> impl Future<Output = Result<Vec<i64>, StoreError>> + Send;

    /// Chunks with the given ids, in the order of `ids`. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    fn chunks_by_ids(
        &self,
        ids: &[i64],
    ) -> impl Future<Output = Result<Vec<Chunk>, StoreError>> + Send;
}

/// Persistence and structural queries for the knowledge graph.
pub trait GraphStore: Send + Sync {
    /// Atomically swap the whole graph of `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn replace_graph(
        &self,
        repo: &str,
        graph: GraphSnapshot,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Section entities of one file ordered by `section_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    fn sections_by_file(
        &self,
        repo: &str,
        file_path: &str,
    ) -> impl Future<Output = Result<Vec<SectionEntity>, StoreError>> + Send;

    /// Code entities a section describes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    fn code_entities_by_section(
        &self,
        repo: &str,
        section_id: &str,
    ) -> impl Future<Output = Result<Vec<CodeEntity>, StoreError>> + Send;

    /// Every file of `repo` with its ordered sections, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    fn file_structure(
        &self,
        repo: &str,
    ) -> impl Future<Output = Result<Vec<FileOutline>, StoreError>> + Send;

    /// Sections describing any code entity called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    fn sections_for_entity(
        &self,
        repo: &str,
        name: &str,
    ) -> impl Future<Output = Result<Vec<SectionEntity>, StoreError>> + Send;

    /// Section index rows whose searchable text contains `term`, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    fn search_section_index(
        &self,
        repo: &str,
        term: &str,
    ) -> impl Future<Output = Result<Vec<SectionIndexEntry>, StoreError>> + Send;
}
