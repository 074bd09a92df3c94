//! Process-local store for tests and one-shot runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;
use crate::store::{
    Chunk, ChunkFilter, ChunkStore, CodeEntity, DESCRIBES, FileOutline, GraphSnapshot, GraphStore,
    SectionEntity, SectionIndexEntry,
};

#[derive(Default)]
struct State {
    next_id: i64,
    chunks: Vec<Chunk>,
    graphs: HashMap<String, GraphSnapshot>,
}

impl State {
    fn assign(&mut self, chunks: Vec<Chunk>) -> Vec<i64> {
        let mut ids = Vec::with_capacity(chunks.len());
        for mut chunk in chunks {
            self.next_id += 1;
            chunk.id = Some(self.next_id);
            ids.push(self.next_id);
            self.chunks.push(chunk);
        }
        ids
    }
}

/// [`ChunkStore`] and [`GraphStore`] over a single `RwLock`.
///
/// Replacements happen under one write guard, so readers never observe a
/// half-written repository.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn with_graph<T: Default>(
        &self,
        repo: &str,
        f: impl FnOnce(&GraphSnapshot) -> T,
    ) -> Result<T, StoreError> {
        let state = self.read()?;
        Ok(state.graphs.get(repo).map(f).unwrap_or_default())
    }
}

impl ChunkStore for InMemoryStore {
    async fn find_chunks(&self, repo: &str, filter: &ChunkFilter) -> Result<Vec<Chunk>, StoreError> {
        let state = self.read()?;
        Ok(state
            .chunks
            .iter()
            .filter(|c| c.repo_name == repo && filter.matches(c))
            .cloned()
            .collect())
    }

    async fn delete_chunks(&self, repo: &str) -> Result<u64, StoreError> {
        let mut state = self.write()?;
        let before = state.chunks.len();
        state.chunks.retain(|c| c.repo_name != repo);
        Ok(u64::try_from(before - state.chunks.len())?)
    }

    async fn insert_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<i64>, StoreError> {
        Ok(self.write()?.assign(chunks))
    }

    async fn replace_chunks(&self, repo: &str, chunks: Vec<Chunk>) -> Result<Vec<i64>, StoreError> {
        let mut state = self.write()?;
        state.chunks.retain(|c| c.repo_name != repo);
        Ok(state.assign(chunks))
    }

    async fn chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<Chunk>, StoreError> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.chunks.iter().find(|c| c.id == Some(*id)).cloned())
            .collect())
    }
}

fn ordered_sections(
    graph: &GraphSnapshot,
    keep: impl Fn(&SectionEntity) -> bool,
) -> Vec<SectionEntity> {
    let mut out: Vec<&SectionEntity> = graph.sections.iter().filter(|s| keep(s)).collect();
    out.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then(a.section_index.cmp(&b.section_index))
    });
    out.into_iter().cloned().collect()
}

impl GraphStore for InMemoryStore {
    async fn replace_graph(&self, repo: &str, graph: GraphSnapshot) -> Result<(), StoreError> {
        self.write()?.graphs.insert(repo.to_owned(), graph);
        Ok(())
    }

    async fn sections_by_file(
        &self,
        repo: &str,
        file_path: &str,
    ) -> Result<Vec<SectionEntity>, StoreError> {
        self.with_graph(repo, |g| ordered_sections(g, |s| s.file_path == file_path))
    }

    async fn code_entities_by_section(
        &self,
        repo: &str,
        section_id: &str,
    ) -> Result<Vec<CodeEntity>, StoreError> {
        self.with_graph(repo, |g| {
            let targets: HashSet<&str> = g
                .relationships
                .iter()
                .filter(|r| r.kind == DESCRIBES && r.from_entity_id == section_id)
                .map(|r| r.to_entity_id.as_str())
                .collect();
            g.code_entities
                .iter()
                .filter(|e| targets.contains(e.id.as_str()))
                .cloned()
                .collect()
        })
    }

    async fn file_structure(&self, repo: &str) -> Result<Vec<FileOutline>, StoreError> {
        self.with_graph(repo, |g| {
            let mut files: BTreeMap<&str, Vec<SectionEntity>> = BTreeMap::new();
            for section in &g.sections {
                files
                    .entry(section.file_path.as_str())
                    .or_default()
                    .push(section.clone());
            }
            files
                .into_iter()
                .map(|(path, mut sections)| {
                    sections.sort_by_key(|s| s.section_index);
                    FileOutline {
                        file_path: path.to_owned(),
                        sections,
                    }
                })
                .collect()
        })
    }

    async fn sections_for_entity(
        &self,
        repo: &str,
        name: &str,
    ) -> Result<Vec<SectionEntity>, StoreError> {
        self.with_graph(repo, |g| {
            let entities: HashSet<&str> = g
                .code_entities
                .iter()
                .filter(|e| e.name == name)
                .map(|e| e.id.as_str())
                .collect();
            let sources: HashSet<&str> = g
                .relationships
                .iter()
                .filter(|r| r.kind == DESCRIBES && entities.contains(r.to_entity_id.as_str()))
                .map(|r| r.from_entity_id.as_str())
                .collect();
            ordered_sections(g, |s| sources.contains(s.id.as_str()))
        })
    }

    async fn search_section_index(
        &self,
        repo: &str,
        term: &str,
    ) -> Result<Vec<SectionIndexEntry>, StoreError> {
        let needle = term.to_ascii_lowercase();
        self.with_graph(repo, |g| {
            g.section_index
                .iter()
                .filter(|e| e.searchable_text.to_ascii_lowercase().contains(&needle))
                .cloned()
                .collect()
        })
    }
}
