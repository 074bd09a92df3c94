use std::io::Write;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 19] = [
    "DOCSMITH_EMBEDDING_PROVIDER",
    "DOCSMITH_EMBEDDING_MODEL",
    "DOCSMITH_EMBEDDING_BASE_URL",
    "DOCSMITH_EMBEDDING_DIMENSIONS",
    "DOCSMITH_LLM_ENABLED",
    "DOCSMITH_LLM_BASE_URL",
    "DOCSMITH_LLM_MODEL",
    "DOCSMITH_LLM_MAX_TOKENS",
    "DOCSMITH_SQLITE_PATH",
    "DOCSMITH_QDRANT_URL",
    "DOCSMITH_QDRANT_COLLECTION",
    "DOCSMITH_INDEX_EXTENSIONS",
    "DOCSMITH_INDEX_ENRICH",
    "DOCSMITH_RETRIEVAL_TOP_K",
    "DOCSMITH_RETRIEVAL_MIN_SCORE",
    "DOCSMITH_RETRIEVAL_QUERY_FALLBACK",
    "DOCSMITH_VOYAGE_API_KEY",
    "DOCSMITH_OPENAI_API_KEY",
    "DOCSMITH_LLM_API_KEY",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docsmith.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    (dir, path)
}

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.embedding.provider, EmbeddingBackend::Voyage);
    assert_eq!(config.embedding.dimensions, 128);
    assert!(config.embedding.model.is_none());
    assert!(config.llm.enabled);
    assert_eq!(config.llm.base_url, DEFAULT_LLM_BASE_URL);
    assert_eq!(config.store.sqlite_path, "docsmith.db");
    assert!(config.store.qdrant_url.is_none());
    assert_eq!(config.store.collection, "docsmith_sections");
    assert_eq!(config.index.extensions, ["md"]);
    assert!(config.index.enrich);
    assert_eq!(config.retrieval.top_k, 6);
    assert!(config.retrieval.min_score.is_none());
    assert!(config.retrieval.query_fallback);
}

#[test]
#[serial]
fn missing_file_uses_defaults() {
    clear_env();
    let config = Config::load(std::path::Path::new("/nonexistent/docsmith.toml")).unwrap();
    assert_eq!(config.retrieval.top_k, 6);
    assert!(config.secrets.voyage_api_key.is_none());
}

#[test]
#[serial]
fn parse_valid_toml() {
    let (_dir, path) = write_config(
        r#"
[embedding]
provider = "openai"
model = "text-embedding-3-large"

[llm]
enabled = false

[store]
sqlite_path = "./test.db"
qdrant_url = "http://localhost:6334"

[index]
extensions = ["md", "mdx"]
enrich = false

[retrieval]
top_k = 3
min_score = 0.25
"#,
    );
    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.embedding.provider, EmbeddingBackend::OpenAi);
    assert_eq!(config.embedding.model.as_deref(), Some("text-embedding-3-large"));
    assert!(!config.llm.enabled);
    assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
    assert_eq!(config.store.sqlite_path, "./test.db");
    assert_eq!(config.store.qdrant_url.as_deref(), Some("http://localhost:6334"));
    assert_eq!(config.index.extensions, ["md", "mdx"]);
    assert!(!config.index.enrich);
    assert_eq!(config.retrieval.top_k, 3);
    assert_eq!(config.retrieval.min_score, Some(0.25));
}

#[test]
#[serial]
fn malformed_toml_is_error() {
    let (_dir, path) = write_config("[retrieval\ntop_k = ");
    clear_env();
    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let (_dir, path) = write_config("[retrieval]\ntop_k = 3\n");
    clear_env();
    unsafe {
        std::env::set_var("DOCSMITH_RETRIEVAL_TOP_K", "9");
        std::env::set_var("DOCSMITH_EMBEDDING_PROVIDER", "hashed");
        std::env::set_var("DOCSMITH_EMBEDDING_DIMENSIONS", "64");
        std::env::set_var("DOCSMITH_INDEX_EXTENSIONS", "md, markdown ,");
        std::env::set_var("DOCSMITH_RETRIEVAL_MIN_SCORE", "0.4");
        std::env::set_var("DOCSMITH_SQLITE_PATH", "/tmp/env.db");
    }

    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.retrieval.top_k, 9);
    assert_eq!(config.embedding.provider, EmbeddingBackend::Hashed);
    assert_eq!(config.embedding.dimensions, 64);
    assert_eq!(config.index.extensions, ["md", "markdown"]);
    assert_eq!(config.retrieval.min_score, Some(0.4));
    assert_eq!(config.store.sqlite_path, "/tmp/env.db");
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("DOCSMITH_EMBEDDING_PROVIDER", "bogus");
        std::env::set_var("DOCSMITH_RETRIEVAL_TOP_K", "many");
        std::env::set_var("DOCSMITH_INDEX_ENRICH", "maybe");
    }

    let config = Config::load(std::path::Path::new("/nonexistent")).unwrap();
    clear_env();

    assert_eq!(config.embedding.provider, EmbeddingBackend::Voyage);
    assert_eq!(config.retrieval.top_k, 6);
    assert!(config.index.enrich);
}

#[test]
#[serial]
fn empty_qdrant_url_disables_mirror() {
    let (_dir, path) = write_config("[store]\nqdrant_url = \"http://localhost:6334\"\n");
    clear_env();
    unsafe { std::env::set_var("DOCSMITH_QDRANT_URL", "") };

    let config = Config::load(&path).unwrap();
    clear_env();
    assert!(config.store.qdrant_url.is_none());
}

#[test]
#[serial]
fn secrets_come_from_env_only() {
    let (_dir, path) = write_config("[secrets]\nvoyage_api_key = \"from-file\"\n");
    clear_env();
    unsafe {
        std::env::set_var("DOCSMITH_LLM_API_KEY", "fw-key");
        std::env::set_var("DOCSMITH_OPENAI_API_KEY", "  ");
    }

    let config = Config::load(&path).unwrap();
    clear_env();

    assert!(config.secrets.voyage_api_key.is_none());
    assert!(config.secrets.openai_api_key.is_none());
    assert_eq!(
        config.secrets.llm_api_key.as_ref().map(Secret::expose),
        Some("fw-key")
    );
}

#[test]
fn secret_is_redacted() {
    let secret = Secret::new("sk-123");
    assert_eq!(format!("{secret:?}"), "[REDACTED]");
    assert_eq!(secret.to_string(), "[REDACTED]");
    assert_eq!(secret.expose(), "sk-123");
}

#[test]
fn validate_rejects_zero_dimensions_for_hashed() {
    let mut config = Config::default();
    config.embedding.provider = EmbeddingBackend::Hashed;
    config.embedding.dimensions = 0;
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_empty_extensions() {
    let mut config = Config::default();
    config.index.extensions.clear();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("index.extensions"));
}

#[test]
fn validate_rejects_non_finite_min_score() {
    let mut config = Config::default();
    config.retrieval.min_score = Some(f32::NAN);
    assert!(config.validate().is_err());
}

#[test]
fn validate_accepts_defaults() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn backend_display() {
    assert_eq!(EmbeddingBackend::OpenAi.to_string(), "openai");
    assert_eq!(EmbeddingBackend::Voyage.as_str(), "voyage");
}
