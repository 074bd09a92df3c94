mod bootstrap;
mod config;
mod draft;
mod jobs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use docsmith_index::graph::GraphBuilder;
use docsmith_index::indexer::DocIndexer;
use docsmith_index::retriever::Retriever;
use docsmith_index::sqlite::SqliteStore;
use docsmith_index::store::GraphStore;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::config::Config;
use crate::draft::{DraftRequest, Drafter};
use crate::jobs::RepoLocks;

#[derive(Parser, Debug)]
#[command(
    name = "docsmith",
    version,
    about = "Find and redraft the documentation sections a code change makes stale"
)]
struct Cli {
    /// Configuration file (defaults to $DOCSMITH_CONFIG, then ./docsmith.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the section index of a repository from a documentation tree
    Index {
        path: PathBuf,
        #[arg(long)]
        repo: String,
        /// Skip LLM metadata extraction
        #[arg(long)]
        no_enrich: bool,
    },
    /// Rebuild the knowledge graph of a repository from a documentation tree
    Graph {
        path: PathBuf,
        #[arg(long)]
        repo: String,
    },
    /// Rank documentation files by relevance to a diff
    Search {
        #[arg(long)]
        repo: String,
        #[command(flatten)]
        ranking: Ranking,
        /// Diff file, or `-` for stdin
        diff: PathBuf,
    },
    /// Show the single section most relevant to a diff
    Section {
        #[arg(long)]
        repo: String,
        /// Diff file, or `-` for stdin
        diff: PathBuf,
    },
    /// Print every indexed file with its ordered sections
    Structure {
        #[arg(long)]
        repo: String,
    },
    /// List the code entities a section describes
    Entities {
        #[arg(long)]
        repo: String,
        /// Section entity id
        #[arg(long)]
        section: String,
    },
    /// Look up sections by file, described code entity or search term
    Sections {
        #[arg(long)]
        repo: String,
        #[command(flatten)]
        lookup: SectionLookup,
    },
    /// Draft updated documentation for a diff
    Draft {
        #[arg(long)]
        repo: String,
        /// Documentation root the repository was indexed from
        #[arg(long)]
        docs: PathBuf,
        #[command(flatten)]
        ranking: Ranking,
        /// Print drafts instead of writing `<file>.draft`
        #[arg(long)]
        dry_run: bool,
        /// Review each draft against the diff and drop the ones that fail
        #[arg(long)]
        verify: bool,
        /// Diff file, or `-` for stdin
        diff: PathBuf,
    },
}

#[derive(Args, Debug)]
struct Ranking {
    /// Number of files to return (defaults to `retrieval.top_k`)
    #[arg(long)]
    top_k: Option<usize>,
    /// Drop files scoring below this similarity
    #[arg(long)]
    min_score: Option<f32>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SectionLookup {
    #[arg(long)]
    file: Option<String>,
    /// Name of a function, endpoint, class, variable or dependency
    #[arg(long)]
    entity: Option<String>,
    /// Case-insensitive match against section headers and openings
    #[arg(long)]
    term: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    tracing::debug!(path = %config_path.display(), "config loaded");

    run(cli.command, &config).await
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(path) = std::env::var("DOCSMITH_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("docsmith.toml")
}

async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    let locks = RepoLocks::beside(Path::new(&config.store.sqlite_path));
    match command {
        Command::Index {
            path,
            repo,
            no_enrich,
        } => {
            let mut lock = locks.open(&repo)?;
            let _guard = lock.acquire().await?;
            run_index(config, &path, &repo, config.index.enrich && !no_enrich).await
        }
        Command::Graph { path, repo } => {
            let mut lock = locks.open(&repo)?;
            let _guard = lock.acquire().await?;
            run_graph(config, &path, &repo).await
        }
        Command::Search {
            repo,
            ranking,
            diff,
        } => run_search(config, &repo, &ranking, &diff).await,
        Command::Section { repo, diff } => run_section(config, &repo, &diff).await,
        Command::Structure { repo } => {
            let store = bootstrap::open_store(config).await?;
            print_json(&store.file_structure(&repo).await?)
        }
        Command::Entities { repo, section } => {
            let store = bootstrap::open_store(config).await?;
            print_json(&store.code_entities_by_section(&repo, &section).await?)
        }
        Command::Sections { repo, lookup } => run_sections(config, &repo, lookup).await,
        Command::Draft {
            repo,
            docs,
            ranking,
            dry_run,
            verify,
            diff,
        } => run_draft(config, &repo, &docs, &ranking, DraftMode { dry_run, verify }, &diff).await,
    }
}

async fn run_index(config: &Config, path: &Path, repo: &str, enrich: bool) -> anyhow::Result<()> {
    let store = bootstrap::open_store(config).await?;
    let embedder = Arc::new(bootstrap::create_embedder(config)?);
    let mut indexer = DocIndexer::new(store, embedder, bootstrap::indexer_config(config));
    if enrich && let Some(llm) = bootstrap::create_llm(config)? {
        indexer = indexer.with_llm(Arc::new(llm));
    }
    if let Some(mirror) = bootstrap::create_mirror(config)? {
        indexer = indexer.with_mirror(mirror);
    }

    let report = indexer
        .index(path, repo, enrich)
        .await
        .with_context(|| format!("indexing {} failed", path.display()))?;
    for error in &report.errors {
        eprintln!("skipped: {error}");
    }
    println!(
        "indexed {} of {} files, {} sections in {} ms",
        report.files_indexed, report.files_scanned, report.sections, report.duration_ms
    );
    Ok(())
}

async fn run_graph(config: &Config, path: &Path, repo: &str) -> anyhow::Result<()> {
    let store = bootstrap::open_store(config).await?;
    let mut builder = GraphBuilder::new(store, config.index.extensions.clone());
    if let Some(llm) = bootstrap::create_llm(config)? {
        builder = builder.with_llm(Arc::new(llm));
    }
    let stats = builder
        .build(path, repo)
        .await
        .with_context(|| format!("graph build for {} failed", path.display()))?;
    println!(
        "{} sections, {} code entities, {} relationships",
        stats.entities, stats.code_entities, stats.relationships
    );
    Ok(())
}

async fn retriever(config: &Config) -> anyhow::Result<Retriever<SqliteStore>> {
    let store = bootstrap::open_store(config).await?;
    let embedder = Arc::new(bootstrap::create_embedder(config)?);
    let mut retriever = Retriever::new(store, embedder, bootstrap::retrieval_config(config));
    if let Some(mirror) = bootstrap::create_mirror(config)? {
        retriever = retriever.with_mirror(mirror);
    }
    Ok(retriever)
}

async fn run_search(
    config: &Config,
    repo: &str,
    ranking: &Ranking,
    diff: &Path,
) -> anyhow::Result<()> {
    let query = read_diff(diff).await?;
    let retriever = retriever(config).await?;
    let files = retriever
        .find_relevant(
            &query,
            repo,
            ranking.top_k.unwrap_or(config.retrieval.top_k),
            ranking.min_score.or(config.retrieval.min_score),
        )
        .await
        .context("search failed")?;
    for file in files {
        println!("{:.4}\t{}", file.score, file.file_path);
    }
    Ok(())
}

async fn run_section(config: &Config, repo: &str, diff: &Path) -> anyhow::Result<()> {
    let query = read_diff(diff).await?;
    let retriever = retriever(config).await?;
    match retriever
        .best_section(&query, repo)
        .await
        .context("section lookup failed")?
    {
        Some(found) => {
            println!(
                "{:.4}\t{}#{}",
                found.score, found.chunk.file_path, found.chunk.section_name
            );
            print!("{}", found.chunk.content);
        }
        None => println!("no indexed sections for {repo}"),
    }
    Ok(())
}

async fn run_sections(config: &Config, repo: &str, lookup: SectionLookup) -> anyhow::Result<()> {
    let store = bootstrap::open_store(config).await?;
    match lookup {
        SectionLookup {
            file: Some(file), ..
        } => print_json(&store.sections_by_file(repo, &file).await?),
        SectionLookup {
            entity: Some(name),
            ..
        } => print_json(&store.sections_for_entity(repo, &name).await?),
        SectionLookup {
            term: Some(term), ..
        } => print_json(&store.search_section_index(repo, &term).await?),
        SectionLookup { .. } => bail!("one of --file, --entity or --term is required"),
    }
}

#[derive(Debug, Clone, Copy)]
struct DraftMode {
    dry_run: bool,
    verify: bool,
}

async fn run_draft(
    config: &Config,
    repo: &str,
    docs: &Path,
    ranking: &Ranking,
    mode: DraftMode,
    diff: &Path,
) -> anyhow::Result<()> {
    let query = read_diff(diff).await?;
    let Some(llm) = bootstrap::create_llm(config)? else {
        bail!("drafting requires [llm] enabled = true");
    };
    let retriever = retriever(config).await?;
    let drafter = Drafter::new(&llm);
    let request = DraftRequest {
        repo,
        docs_root: docs,
        diff: &query,
        top_k: ranking.top_k.unwrap_or(config.retrieval.top_k),
        min_score: ranking.min_score.or(config.retrieval.min_score),
    };

    let mut updates = draft::draft_updates(&retriever, &drafter, &request).await;
    if mode.verify {
        updates = draft::keep_verified(&drafter, &query, updates).await;
    }
    if updates.is_empty() {
        println!("no documentation changes proposed");
        return Ok(());
    }
    for update in updates {
        if mode.dry_run {
            println!("===== {} =====\n{}", update.file_path, update.content);
            continue;
        }
        let target = docs.join(format!("{}.draft", update.file_path));
        tokio::fs::write(&target, update.content.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        println!("wrote {}", target.display());
    }
    Ok(())
}

/// Read a diff from a file or stdin and turn it into retrieval query text.
async fn read_diff(path: &Path) -> anyhow::Result<String> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read diff from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read diff {}", path.display()))?
    };
    Ok(diff_query(&raw))
}

fn diff_query(raw: &str) -> String {
    if raw.contains("diff --git ") {
        draft::build_combined_diff(&draft::parse_unified_diff(raw))
    } else {
        raw.trim().to_owned()
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_search() {
        let cli = Cli::parse_from([
            "docsmith", "search", "--repo", "demo", "--top-k", "3", "change.diff",
        ]);
        let Command::Search {
            repo,
            ranking,
            diff,
        } = cli.command
        else {
            panic!("expected search");
        };
        assert_eq!(repo, "demo");
        assert_eq!(ranking.top_k, Some(3));
        assert!(ranking.min_score.is_none());
        assert_eq!(diff, PathBuf::from("change.diff"));
    }

    #[test]
    fn cli_global_config_flag() {
        let cli = Cli::parse_from([
            "docsmith",
            "structure",
            "--repo",
            "demo",
            "--config",
            "custom.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    }

    #[test]
    fn cli_sections_requires_one_lookup() {
        assert!(Cli::try_parse_from(["docsmith", "sections", "--repo", "demo"]).is_err());
        assert!(
            Cli::try_parse_from([
                "docsmith", "sections", "--repo", "demo", "--file", "a.md", "--term", "x",
            ])
            .is_err()
        );
        assert!(
            Cli::try_parse_from(["docsmith", "sections", "--repo", "demo", "--entity", "f"])
                .is_ok()
        );
    }

    #[test]
    fn cli_draft_flags() {
        let cli = Cli::parse_from([
            "docsmith", "draft", "--repo", "r", "--docs", "docs", "--dry-run", "--verify", "-",
        ]);
        let Command::Draft {
            dry_run,
            verify,
            diff,
            ..
        } = cli.command
        else {
            panic!("expected draft");
        };
        assert!(dry_run);
        assert!(verify);
        assert_eq!(diff, PathBuf::from("-"));
    }

    #[test]
    fn config_flag_wins() {
        let path = resolve_config_path(Some(PathBuf::from("x.toml")));
        assert_eq!(path, PathBuf::from("x.toml"));
    }

    #[test]
    fn plain_text_query_is_trimmed() {
        assert_eq!(diff_query("  added POST /users \n"), "added POST /users");
    }

    #[test]
    fn git_diff_query_uses_file_blocks() {
        let raw = "diff --git a/src/a.rs b/src/a.rs\n+++ b/src/a.rs\n+fn a() {}\n";
        let query = diff_query(raw);
        assert!(query.starts_with("FILE: src/a.rs\nPATCH:\n"));
        assert!(query.contains("+fn a() {}"));
    }
}
