//! Knowledge graph of documentation sections and the code entities they describe.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use docsmith_llm::any::AnyProvider;
use docsmith_llm::{LlmError, LlmProvider};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::chunker::{Section, chunk_markdown};
use crate::corpus::discover_documents;
use crate::error::Result;
use crate::section_prompt::{SectionPrompt, string_or_list};
use crate::store::{
    CodeEntity, DESCRIBES, EntityType, GraphSnapshot, GraphStore, Relationship, SectionEntity,
    SectionIndexEntry,
};

/// Characters of section text copied into the section index.
const SEARCHABLE_PREFIX_CHARS: usize = 200;

const ENTITY_TASK: &str = "You extract code references from one section of project \
documentation. Fill each list with names exactly as written in the text: functions for function \
or method names, endpoints for HTTP endpoints as method and path, classes for class or type \
names, variables for configuration keys, environment variables or parameters, dependencies for \
external services or libraries. Leave a list empty when nothing applies.";

/// Code references found in one section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CodeEntities {
    #[serde(default, deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub functions: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub endpoints: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub classes: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub variables: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub dependencies: Vec<String>,
}

impl CodeEntities {
    fn list(&self, entity_type: EntityType) -> &[String] {
        match entity_type {
            EntityType::Function => &self.functions,
            EntityType::Endpoint => &self.endpoints,
            EntityType::Class => &self.classes,
            EntityType::Variable => &self.variables,
            EntityType::Dependency => &self.dependencies,
        }
    }

    /// Trim names, drop blanks and repeats within each list.
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(names: Vec<String>) -> Vec<String> {
            let mut out: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                let name = name.trim();
                if !name.is_empty() && !out.iter().any(|n| n == name) {
                    out.push(name.to_owned());
                }
            }
            out
        }
        Self {
            functions: clean(self.functions),
            endpoints: clean(self.endpoints),
            classes: clean(self.classes),
            variables: clean(self.variables),
            dependencies: clean(self.dependencies),
        }
    }

    /// Every `(type, name)` pair in category order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityType, &str)> {
        EntityType::ALL
            .into_iter()
            .flat_map(move |t| self.list(t).iter().map(move |name| (t, name.as_str())))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Ask `provider` which code entities a section references.
///
/// # Errors
///
/// Returns an error if the provider fails or the reply is not valid JSON
/// for [`CodeEntities`].
pub async fn extract_code_entities<P: LlmProvider>(
    provider: &P,
    header: &str,
    content: &str,
) -> std::result::Result<CodeEntities, LlmError> {
    let entities = SectionPrompt::new(ENTITY_TASK, header, content)
        .ask::<CodeEntities, _>(provider)
        .await?;
    Ok(entities.normalized())
}

/// `"{repo}:{file}:{index}:{header}"`
#[must_use]
pub fn section_id(repo: &str, file_path: &str, index: usize, header: &str) -> String {
    format!("{repo}:{file_path}:{index}:{header}")
}

/// `"{repo}:{type}:{name}"`
#[must_use]
pub fn code_entity_id(repo: &str, entity_type: EntityType, name: &str) -> String {
    format!("{repo}:{}:{name}", entity_type.as_str())
}

/// Counts of what a graph build wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Section entities.
    pub entities: usize,
    pub code_entities: usize,
    pub relationships: usize,
    /// Section index rows.
    pub sections: usize,
}

/// Accumulates one repository's graph while files are processed.
struct GraphAccumulator {
    repo: String,
    snapshot: GraphSnapshot,
    entity_slots: HashMap<String, usize>,
}

impl GraphAccumulator {
    fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_owned(),
            snapshot: GraphSnapshot::default(),
            entity_slots: HashMap::new(),
        }
    }

    fn add_section(&mut self, file_path: &str, section: &Section, entities: &CodeEntities) {
        let id = section_id(&self.repo, file_path, section.index, &section.header);

        for (entity_type, name) in entities.iter() {
            let entity_id = code_entity_id(&self.repo, entity_type, name);
            let slot = *self
                .entity_slots
                .entry(entity_id.clone())
                .or_insert_with(|| {
                    self.snapshot.code_entities.push(CodeEntity {
                        id: entity_id.clone(),
                        repo_name: self.repo.clone(),
                        entity_type,
                        name: name.to_owned(),
                        related_sections: Vec::new(),
                        extracted_from: Vec::new(),
                    });
                    self.snapshot.code_entities.len() - 1
                });
            let entity = &mut self.snapshot.code_entities[slot];
            entity.related_sections.push(id.clone());
            if !entity.extracted_from.contains(&section.header) {
                entity.extracted_from.push(section.header.clone());
            }

            self.snapshot.relationships.push(Relationship {
                repo_name: self.repo.clone(),
                from_entity_id: id.clone(),
                to_entity_id: entity_id,
                relationship_type: entity_type.describes_relation(),
                kind: DESCRIBES.to_owned(),
            });
        }

        let prefix: String = section.content.chars().take(SEARCHABLE_PREFIX_CHARS).collect();
        self.snapshot.section_index.push(SectionIndexEntry {
            repo_name: self.repo.clone(),
            section_id: id.clone(),
            file_path: file_path.to_owned(),
            section_name: section.header.clone(),
            searchable_text: format!("{} {prefix}", section.header),
        });

        self.snapshot.sections.push(SectionEntity {
            id,
            repo_name: self.repo.clone(),
            file_path: file_path.to_owned(),
            section_name: section.header.clone(),
            section_index: section.index,
            content: section.content.clone(),
        });
    }

    fn finish(self) -> (GraphSnapshot, GraphStats) {
        let stats = GraphStats {
            entities: self.snapshot.sections.len(),
            code_entities: self.snapshot.code_entities.len(),
            relationships: self.snapshot.relationships.len(),
            sections: self.snapshot.section_index.len(),
        };
        (self.snapshot, stats)
    }
}

/// Rebuilds the knowledge graph of a repository from its documentation tree.
pub struct GraphBuilder<S> {
    store: Arc<S>,
    llm: Option<Arc<AnyProvider>>,
    extensions: Vec<String>,
}

impl<S: GraphStore> GraphBuilder<S> {
    #[must_use]
    pub fn new(store: Arc<S>, extensions: Vec<String>) -> Self {
        Self {
            store,
            llm: None,
            extensions,
        }
    }

    /// Provider used for code entity extraction. Without one, sections are
    /// recorded with no code entities.
    #[must_use]
    pub fn with_llm(mut self, llm: Arc<AnyProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Replace the graph of `repo` with one built from the files under `root`.
    ///
    /// Unreadable files and failed per-section extractions are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be walked or the store write fails.
    pub async fn build(&self, root: &Path, repo: &str) -> Result<GraphStats> {
        let discovery = discover_documents(root, &self.extensions)?;
        tracing::info!(repo, files = discovery.documents.len(), "graph build started");
        if self.llm.is_none() {
            tracing::warn!("no LLM provider configured; sections get no code entities");
        }

        let mut graph = GraphAccumulator::new(repo);
        let mut failed_sections = 0usize;

        for doc in &discovery.documents {
            let text = match tokio::fs::read_to_string(&doc.path).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(file = %doc.relative_path, "failed to read: {e:#}");
                    continue;
                }
            };
            let sections = chunk_markdown(&text);
            if sections.iter().all(Section::is_blank) {
                continue;
            }

            for section in &sections {
                let entities = match (&self.llm, section.is_blank()) {
                    (Some(llm), false) => {
                        match extract_code_entities(llm.as_ref(), &section.header, &section.content)
                            .await
                        {
                            Ok(entities) => entities,
                            Err(e) => {
                                failed_sections += 1;
                                tracing::warn!(
                                    file = %doc.relative_path,
                                    section = %section.header,
                                    "entity extraction failed: {e:#}"
                                );
                                CodeEntities::default()
                            }
                        }
                    }
                    _ => CodeEntities::default(),
                };
                graph.add_section(&doc.relative_path, section, &entities);
            }
        }

        let (snapshot, stats) = graph.finish();
        self.store.replace_graph(repo, snapshot).await?;
        tracing::info!(
            repo,
            entities = stats.entities,
            code_entities = stats.code_entities,
            relationships = stats.relationships,
            failed_sections,
            "graph built"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use docsmith_llm::mock::MockProvider;

    #[tokio::test]
    async fn entity_reply_tolerates_single_names_and_nulls() {
        let provider = MockProvider::with_responses(vec![
            r#"{"functions":"parse_config","endpoints":null,"classes":["Config"," Config"]}"#.into(),
        ]);
        let entities = extract_code_entities(&provider, "Config", "Call parse_config() to build a Config.")
            .await
            .unwrap();
        assert_eq!(entities.functions, ["parse_config"]);
        assert!(entities.endpoints.is_empty());
        assert_eq!(entities.classes, ["Config"]);
        assert!(entities.dependencies.is_empty());
    }

    #[test]
    fn normalization_trims_and_dedupes() {
        let raw = CodeEntities {
            functions: vec![" run ".into(), "run".into(), String::new(), "stop".into()],
            endpoints: vec!["  ".into()],
            ..CodeEntities::default()
        };
        let clean = raw.normalized();
        assert_eq!(clean.functions, ["run", "stop"]);
        assert!(clean.endpoints.is_empty());
    }

    #[test]
    fn missing_keys_default_to_empty() {
        let parsed: CodeEntities = serde_json::from_str(r#"{"functions":["f"]}"#).unwrap();
        assert_eq!(parsed.functions, ["f"]);
        assert!(parsed.classes.is_empty());
        let pairs: Vec<_> = parsed.iter().collect();
        assert_eq!(pairs, [(EntityType::Function, "f")]);
    }

    #[test]
    fn ids_follow_format() {
        assert_eq!(section_id("r", "docs/a.md", 2, "API"), "r:docs/a.md:2:API");
        assert_eq!(code_entity_id("r", EntityType::Endpoint, "GET /x"), "r:endpoint:GET /x");
    }

    #[test]
    fn accumulator_dedupes_entities_across_sections() {
        let mut acc = GraphAccumulator::new("r");
        let sections = chunk_markdown("intro\n## Run\nrun()\n## Again\nrun() again\n");
        let run = CodeEntities {
            functions: vec!["run".into()],
            ..CodeEntities::default()
        };
        acc.add_section("a.md", &sections[0], &CodeEntities::default());
        acc.add_section("a.md", &sections[1], &run);
        acc.add_section("a.md", &sections[2], &run);
        let (snapshot, stats) = acc.finish();

        assert_eq!(
            stats,
            GraphStats {
                entities: 3,
                code_entities: 1,
                relationships: 2,
                sections: 3,
            }
        );
        let entity = &snapshot.code_entities[0];
        assert_eq!(entity.id, "r:function:run");
        assert_eq!(entity.related_sections, ["r:a.md:1:Run", "r:a.md:2:Again"]);
        assert_eq!(entity.extracted_from, ["Run", "Again"]);
        assert_eq!(snapshot.relationships[0].relationship_type, "section_describes_function");
        assert_eq!(snapshot.relationships[0].kind, "describes");
        assert_eq!(snapshot.section_index[1].searchable_text, "Run ## Run\nrun()\n");
    }

    #[test]
    fn searchable_text_is_capped() {
        let mut acc = GraphAccumulator::new("r");
        let long = format!("## Long\n{}", "é".repeat(500));
        let sections = chunk_markdown(&long);
        acc.add_section("a.md", &sections[1], &CodeEntities::default());
        let (snapshot, _) = acc.finish();
        let text = &snapshot.section_index[0].searchable_text;
        assert_eq!(text.chars().count(), "Long ".len() + SEARCHABLE_PREFIX_CHARS);
    }

    #[tokio::test]
    async fn build_writes_graph_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("doc.md"),
            "Intro text\n## Setup\nRun `install()`\n## API\nGET /users\n",
        )
        .unwrap();
        let llm = MockProvider::with_responses(vec![
            "{}".into(),
            r#"{"functions":["install"]}"#.into(),
            r#"{"endpoints":["GET /users"],"functions":["install"]}"#.into(),
        ]);
        let store = Arc::new(InMemoryStore::new());
        let builder = GraphBuilder::new(store.clone(), vec!["md".into()])
            .with_llm(Arc::new(AnyProvider::Mock(llm)));

        let stats = builder.build(dir.path(), "r").await.unwrap();
        assert_eq!(stats.entities, 3);
        assert_eq!(stats.code_entities, 2);
        assert_eq!(stats.relationships, 3);
        assert_eq!(stats.sections, 3);

        let install = store.sections_for_entity("r", "install").await.unwrap();
        let names: Vec<_> = install.iter().map(|s| s.section_name.as_str()).collect();
        assert_eq!(names, ["Setup", "API"]);

        let structure = store.file_structure("r").await.unwrap();
        assert_eq!(structure.len(), 1);
        assert_eq!(structure[0].sections.len(), 3);
    }

    #[tokio::test]
    async fn extraction_failure_isolated_to_section() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("doc.md"),
            "## Good\ncall run()\n## Broken\nPOISON\n## Also good\ncall stop()\n",
        )
        .unwrap();
        let llm = MockProvider::with_responses(vec![
            r#"{"functions":["run"]}"#.into(),
            r#"{"functions":["stop"]}"#.into(),
        ])
        .with_chat_failure_on("POISON");
        let store = Arc::new(InMemoryStore::new());
        let stats = GraphBuilder::new(store.clone(), vec!["md".into()])
            .with_llm(Arc::new(AnyProvider::Mock(llm)))
            .build(dir.path(), "r")
            .await
            .unwrap();

        // blank introduction + three sections
        assert_eq!(stats.entities, 4);
        assert_eq!(stats.code_entities, 2);
        assert_eq!(stats.relationships, 2);
        let broken = section_id("r", "doc.md", 2, "Broken");
        assert!(store.code_entities_by_section("r", &broken).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_graph() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "one\n## Two\n").unwrap();
        let store = Arc::new(InMemoryStore::new());
        let builder = GraphBuilder::new(store.clone(), vec!["md".into()]);
        builder.build(dir.path(), "r").await.unwrap();
        std::fs::write(dir.path().join("a.md"), "only\n").unwrap();
        let stats = builder.build(dir.path(), "r").await.unwrap();
        assert_eq!(stats.entities, 1);
        assert_eq!(store.file_structure("r").await.unwrap()[0].sections.len(), 1);
    }
}
