//! `SQLite` persistence for chunks and the knowledge graph.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::StoreError;
use crate::store::{
    Chunk, ChunkFilter, ChunkMetadata, ChunkStore, CodeEntity, EntityType, FileOutline,
    GraphSnapshot, GraphStore, SectionEntity, SectionIndexEntry,
};

const CHUNK_COLUMNS: &str = "id, repo_name, file_path, section_name, section_index, content, \
     enriched_text, embedding, content_hash, metadata";

type ChunkRow = (
    i64,
    String,
    String,
    String,
    i64,
    String,
    Option<String>,
    Option<Vec<u8>>,
    String,
    String,
);

type SectionRow = (String, String, String, String, i64, String);

type EntityRow = (String, String, String, String, String, String);

/// Chunk and graph store backed by a single `SQLite` file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database on a single connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let mut pool_opts = SqlitePoolOptions::new().max_connections(5);
        if in_memory {
            // the database lives exactly as long as its one connection
            pool_opts = pool_opts
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_chunks_tx(
        tx: &mut Transaction<'_, Sqlite>,
        chunks: Vec<Chunk>,
    ) -> Result<Vec<i64>, StoreError> {
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let metadata = serde_json::to_string(&chunk.metadata)?;
            let embedding = chunk.embedding.as_deref().map(encode_embedding);
            let id = sqlx::query(
                "INSERT INTO chunks \
                 (repo_name, file_path, section_name, section_index, content, enriched_text, \
                  embedding, content_hash, metadata) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.repo_name)
            .bind(&chunk.file_path)
            .bind(&chunk.section_name)
            .bind(i64::try_from(chunk.section_index)?)
            .bind(&chunk.content)
            .bind(&chunk.enriched_text)
            .bind(embedding)
            .bind(&chunk.content_hash)
            .bind(metadata)
            .execute(&mut **tx)
            .await?
            .last_insert_rowid();
            ids.push(id);
        }
        Ok(ids)
    }

    async fn query_sections(
        &self,
        sql: &str,
        binds: &[&str],
    ) -> Result<Vec<SectionEntity>, StoreError> {
        let mut query = sqlx::query_as::<_, SectionRow>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(section_from_row)
            .collect()
    }
}

/// Serialize an embedding as packed little-endian `f32`.
fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, StoreError> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::Corrupt(format!(
            "embedding blob of {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn chunk_from_row(row: ChunkRow) -> Result<Chunk, StoreError> {
    let (
        id,
        repo_name,
        file_path,
        section_name,
        section_index,
        content,
        enriched_text,
        embedding,
        content_hash,
        metadata,
    ) = row;
    Ok(Chunk {
        id: Some(id),
        repo_name,
        file_path,
        section_name,
        section_index: usize::try_from(section_index)?,
        content,
        enriched_text,
        embedding: embedding.as_deref().map(decode_embedding).transpose()?,
        content_hash,
        metadata: serde_json::from_str::<ChunkMetadata>(&metadata)?,
    })
}

fn section_from_row(row: SectionRow) -> Result<SectionEntity, StoreError> {
    let (id, repo_name, file_path, section_name, section_index, content) = row;
    Ok(SectionEntity {
        id,
        repo_name,
        file_path,
        section_name,
        section_index: usize::try_from(section_index)?,
        content,
    })
}

fn entity_from_row(row: EntityRow) -> Result<CodeEntity, StoreError> {
    let (id, repo_name, entity_type, name, related_sections, extracted_from) = row;
    Ok(CodeEntity {
        id,
        repo_name,
        entity_type: entity_type.parse::<EntityType>()?,
        name,
        related_sections: serde_json::from_str(&related_sections)?,
        extracted_from: serde_json::from_str(&extracted_from)?,
    })
}

impl ChunkStore for SqliteStore {
    async fn find_chunks(&self, repo: &str, filter: &ChunkFilter) -> Result<Vec<Chunk>, StoreError> {
        let rows: Vec<ChunkRow> = sqlx::query_as(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks \
             WHERE repo_name = ? \
               AND (? IS NULL OR file_path = ?) \
               AND (? = 0 OR embedding IS NOT NULL) \
             ORDER BY id"
        ))
        .bind(repo)
        .bind(filter.file_path.as_deref())
        .bind(filter.file_path.as_deref())
        .bind(filter.with_embedding_only)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(chunk_from_row).collect()
    }

    async fn delete_chunks(&self, repo: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM chunks WHERE repo_name = ?")
            .bind(repo)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let ids = Self::insert_chunks_tx(&mut tx, chunks).await?;
        tx.commit().await?;
        Ok(ids)
    }

    async fn replace_chunks(&self, repo: &str, chunks: Vec<Chunk>) -> Result<Vec<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM chunks WHERE repo_name = ?")
            .bind(repo)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let ids = Self::insert_chunks_tx(&mut tx, chunks).await?;
        tx.commit().await?;
        tracing::debug!(repo, removed, inserted = ids.len(), "replaced chunk set");
        Ok(ids)
    }

    async fn chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<Chunk>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, ChunkRow>(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let mut by_id: HashMap<i64, Chunk> = HashMap::new();
        for row in query.fetch_all(&self.pool).await? {
            let chunk = chunk_from_row(row)?;
            if let Some(id) = chunk.id {
                by_id.insert(id, chunk);
            }
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

impl GraphStore for SqliteStore {
    async fn replace_graph(&self, repo: &str, graph: GraphSnapshot) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for table in ["knowledge_sections", "code_entities", "relationships", "section_index"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE repo_name = ?"))
                .bind(repo)
                .execute(&mut *tx)
                .await?;
        }

        for s in &graph.sections {
            sqlx::query(
                "INSERT INTO knowledge_sections \
                 (id, repo_name, file_path, section_name, section_index, content) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&s.id)
            .bind(&s.repo_name)
            .bind(&s.file_path)
            .bind(&s.section_name)
            .bind(i64::try_from(s.section_index)?)
            .bind(&s.content)
            .execute(&mut *tx)
            .await?;
        }

        for e in &graph.code_entities {
            sqlx::query(
                "INSERT INTO code_entities \
                 (id, repo_name, entity_type, name, related_sections, extracted_from) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&e.id)
            .bind(&e.repo_name)
            .bind(e.entity_type.as_str())
            .bind(&e.name)
            .bind(serde_json::to_string(&e.related_sections)?)
            .bind(serde_json::to_string(&e.extracted_from)?)
            .execute(&mut *tx)
            .await?;
        }

        for r in &graph.relationships {
            sqlx::query(
                "INSERT INTO relationships \
                 (repo_name, from_entity_id, to_entity_id, relationship_type, kind) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&r.repo_name)
            .bind(&r.from_entity_id)
            .bind(&r.to_entity_id)
            .bind(&r.relationship_type)
            .bind(&r.kind)
            .execute(&mut *tx)
            .await?;
        }

        for entry in &graph.section_index {
            sqlx::query(
                "INSERT INTO section_index \
                 (repo_name, section_id, file_path, section_name, searchable_text) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&entry.repo_name)
            .bind(&entry.section_id)
            .bind(&entry.file_path)
            .bind(&entry.section_name)
            .bind(&entry.searchable_text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn sections_by_file(
        &self,
        repo: &str,
        file_path: &str,
    ) -> Result<Vec<SectionEntity>, StoreError> {
        self.query_sections(
            "SELECT id, repo_name, file_path, section_name, section_index, content \
             FROM knowledge_sections WHERE repo_name = ? AND file_path = ? \
             ORDER BY section_index",
            &[repo, file_path],
        )
        .await
    }

    async fn code_entities_by_section(
        &self,
        repo: &str,
        section_id: &str,
    ) -> Result<Vec<CodeEntity>, StoreError> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            "SELECT e.id, e.repo_name, e.entity_type, e.name, e.related_sections, e.extracted_from \
             FROM code_entities e \
             WHERE e.repo_name = ? AND EXISTS ( \
                 SELECT 1 FROM relationships r \
                 WHERE r.repo_name = e.repo_name AND r.kind = 'describes' \
                   AND r.from_entity_id = ? AND r.to_entity_id = e.id) \
             ORDER BY e.rowid",
        )
        .bind(repo)
        .bind(section_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(entity_from_row).collect()
    }

    async fn file_structure(&self, repo: &str) -> Result<Vec<FileOutline>, StoreError> {
        let sections = self
            .query_sections(
                "SELECT id, repo_name, file_path, section_name, section_index, content \
                 FROM knowledge_sections WHERE repo_name = ? \
                 ORDER BY file_path, section_index",
                &[repo],
            )
            .await?;

        let mut outlines: Vec<FileOutline> = Vec::new();
        for section in sections {
            match outlines.last_mut() {
                Some(last) if last.file_path == section.file_path => last.sections.push(section),
                _ => outlines.push(FileOutline {
                    file_path: section.file_path.clone(),
                    sections: vec![section],
                }),
            }
        }
        Ok(outlines)
    }

    async fn sections_for_entity(
        &self,
        repo: &str,
        name: &str,
    ) -> Result<Vec<SectionEntity>, StoreError> {
        self.query_sections(
            "SELECT s.id, s.repo_name, s.file_path, s.section_name, s.section_index, s.content \
             FROM knowledge_sections s \
             WHERE s.repo_name = ?1 AND s.id IN ( \
                 SELECT r.from_entity_id FROM relationships r \
                 JOIN code_entities e ON e.repo_name = r.repo_name AND e.id = r.to_entity_id \
                 WHERE r.repo_name = ?1 AND r.kind = 'describes' AND e.name = ?2) \
             ORDER BY s.file_path, s.section_index",
            &[repo, name],
        )
        .await
    }

    async fn search_section_index(
        &self,
        repo: &str,
        term: &str,
    ) -> Result<Vec<SectionIndexEntry>, StoreError> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT repo_name, section_id, file_path, section_name, searchable_text \
             FROM section_index \
             WHERE repo_name = ? AND instr(lower(searchable_text), lower(?)) > 0 \
             ORDER BY id",
        )
        .bind(repo)
        .bind(term)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(repo_name, section_id, file_path, section_name, searchable_text)| {
                    SectionIndexEntry {
                        repo_name,
                        section_id,
                        file_path,
                        section_name,
                        searchable_text,
                    }
                },
            )
            .collect())
    }
}
