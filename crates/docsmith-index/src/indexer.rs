//! Documentation indexing orchestrator: walk → chunk → enrich → embed → store.

use std::path::Path;
use std::sync::Arc;

use docsmith_llm::any::AnyProvider;
use docsmith_llm::{EmbedMode, EmbeddingProvider};

use crate::chunker::chunk_markdown;
use crate::corpus::discover_documents;
use crate::enrich::{SectionMetadata, enriched_text, extract_section_metadata};
use crate::error::{IndexError, Result};
use crate::qdrant::SectionVectorIndex;
use crate::store::{Chunk, ChunkMetadata, ChunkStore};

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// File extensions treated as documentation.
    pub extensions: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["md".into()],
        }
    }
}

/// Summary of an indexing run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub sections: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Rebuilds the stored chunk set of a repository from its documentation tree.
pub struct DocIndexer<S> {
    store: Arc<S>,
    embedder: Arc<AnyProvider>,
    llm: Option<Arc<AnyProvider>>,
    mirror: Option<SectionVectorIndex>,
    config: IndexerConfig,
}

impl<S: ChunkStore> DocIndexer<S> {
    #[must_use]
    pub fn new(store: Arc<S>, embedder: Arc<AnyProvider>, config: IndexerConfig) -> Self {
        Self {
            store,
            embedder,
            llm: None,
            mirror: None,
            config,
        }
    }

    /// Provider used for section metadata extraction when enriching.
    #[must_use]
    pub fn with_llm(mut self, llm: Arc<AnyProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Vector index to mirror embeddings into after each successful run.
    #[must_use]
    pub fn with_mirror(mut self, mirror: SectionVectorIndex) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Replace the chunk set of `repo` with the sections found under `root`.
    ///
    /// Unreadable files are logged, reported in [`IndexReport::errors`] and
    /// skipped. All sections are embedded in a single batch before anything
    /// is written, so a failed batch leaves the previous chunk set intact.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be walked, the embedding batch fails,
    /// or the store or mirror write fails.
    pub async fn index(&self, root: &Path, repo: &str, enrich: bool) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let mut report = IndexReport::default();

        let discovery = discover_documents(root, &self.config.extensions)?;
        report.errors.extend(discovery.errors);
        tracing::info!(repo, files = discovery.documents.len(), enrich, "indexing started");

        if enrich && self.llm.is_none() {
            tracing::warn!("enrichment requested without an LLM provider; using fallback metadata");
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut slots: Vec<usize> = Vec::new();

        for doc in &discovery.documents {
            report.files_scanned += 1;
            let text = match tokio::fs::read_to_string(&doc.path).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(file = %doc.relative_path, "failed to read: {e:#}");
                    report.errors.push(format!("{}: {e:#}", doc.relative_path));
                    continue;
                }
            };

            let sections = chunk_markdown(&text);
            if sections.iter().all(crate::chunker::Section::is_blank) {
                tracing::debug!(file = %doc.relative_path, "no content, skipped");
                continue;
            }

            let total = sections.len();
            let mut line_start = 1;
            for section in sections {
                let metadata = ChunkMetadata {
                    summary: None,
                    keywords: Vec::new(),
                    line_start,
                    sections_in_file: total,
                };
                line_start += section.content.matches('\n').count();

                let mut chunk = Chunk {
                    id: None,
                    repo_name: repo.to_owned(),
                    file_path: doc.relative_path.clone(),
                    section_name: section.header.clone(),
                    section_index: section.index,
                    content_hash: blake3::hash(section.content.as_bytes())
                        .to_hex()
                        .to_string(),
                    content: String::new(),
                    enriched_text: None,
                    embedding: None,
                    metadata,
                };

                if !section.is_blank() {
                    let extracted = if enrich {
                        Some(
                            self.section_metadata(
                                &doc.relative_path,
                                &section.header,
                                &section.content,
                            )
                            .await,
                        )
                    } else {
                        None
                    };
                    let text =
                        enriched_text(&doc.relative_path, &section.content, extracted.as_ref());
                    if let Some(meta) = extracted {
                        chunk.metadata.summary = Some(meta.summary);
                        chunk.metadata.keywords = meta.keywords;
                    }
                    chunk.enriched_text = Some(text);
                    slots.push(chunks.len());
                }

                chunk.content = section.content;
                chunks.push(chunk);
            }

            report.files_indexed += 1;
            tracing::debug!(file = %doc.relative_path, sections = total, "chunked");
        }

        let texts: Vec<String> = slots
            .iter()
            .map(|&slot| chunks[slot].embedding_text().to_owned())
            .collect();
        if !texts.is_empty() {
            let vectors = self.embedder.embed_batch(&texts, EmbedMode::Document).await?;
            if vectors.len() != texts.len() {
                return Err(IndexError::Other(format!(
                    "embedding provider returned {} vectors for {} sections",
                    vectors.len(),
                    texts.len()
                )));
            }
            for (slot, vector) in slots.into_iter().zip(vectors) {
                chunks[slot].embedding = Some(vector);
            }
        }

        let ids = self.store.replace_chunks(repo, chunks.clone()).await?;
        for (chunk, id) in chunks.iter_mut().zip(ids) {
            chunk.id = Some(id);
        }
        report.sections = chunks.len();

        if let Some(mirror) = &self.mirror {
            mirror.sync_repo(repo, &chunks).await?;
        }

        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            repo,
            files = report.files_indexed,
            sections = report.sections,
            embedded = texts.len(),
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "indexing complete"
        );
        Ok(report)
    }

    async fn section_metadata(
        &self,
        file_path: &str,
        header: &str,
        content: &str,
    ) -> SectionMetadata {
        match &self.llm {
            Some(llm) => extract_section_metadata(llm.as_ref(), file_path, header, content).await,
            None => SectionMetadata::fallback(content),
        }
    }
}
