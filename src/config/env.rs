use super::{Config, Secret};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_core();
        self.apply_env_secrets();
    }

    fn apply_env_overrides_core(&mut self) {
        if let Ok(v) = std::env::var("DOCSMITH_EMBEDDING_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.provider = kind;
            } else {
                tracing::warn!("ignoring invalid DOCSMITH_EMBEDDING_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCSMITH_EMBEDDING_MODEL") {
            self.embedding.model = Some(v);
        }
        if let Ok(v) = std::env::var("DOCSMITH_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("DOCSMITH_EMBEDDING_DIMENSIONS")
            && let Ok(dims) = v.parse::<usize>()
        {
            self.embedding.dimensions = dims;
        }
        if let Ok(v) = std::env::var("DOCSMITH_LLM_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.llm.enabled = enabled;
        }
        if let Ok(v) = std::env::var("DOCSMITH_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("DOCSMITH_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("DOCSMITH_LLM_MAX_TOKENS")
            && let Ok(tokens) = v.parse::<u32>()
        {
            self.llm.max_tokens = tokens;
        }
        if let Ok(v) = std::env::var("DOCSMITH_SQLITE_PATH") {
            self.store.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("DOCSMITH_QDRANT_URL") {
            self.store.qdrant_url = (!v.is_empty()).then_some(v);
        }
        if let Ok(v) = std::env::var("DOCSMITH_QDRANT_COLLECTION") {
            self.store.collection = v;
        }
        if let Ok(v) = std::env::var("DOCSMITH_INDEX_EXTENSIONS") {
            self.index.extensions = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(v) = std::env::var("DOCSMITH_INDEX_ENRICH")
            && let Ok(enrich) = v.parse::<bool>()
        {
            self.index.enrich = enrich;
        }
        if let Ok(v) = std::env::var("DOCSMITH_RETRIEVAL_TOP_K")
            && let Ok(top_k) = v.parse::<usize>()
        {
            self.retrieval.top_k = top_k;
        }
        if let Ok(v) = std::env::var("DOCSMITH_RETRIEVAL_MIN_SCORE")
            && let Ok(score) = v.parse::<f32>()
        {
            self.retrieval.min_score = Some(score);
        }
        if let Ok(v) = std::env::var("DOCSMITH_RETRIEVAL_QUERY_FALLBACK")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.retrieval.query_fallback = enabled;
        }
    }

    fn apply_env_secrets(&mut self) {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Secret::new)
        };
        if let Some(key) = read("DOCSMITH_VOYAGE_API_KEY") {
            self.secrets.voyage_api_key = Some(key);
        }
        if let Some(key) = read("DOCSMITH_OPENAI_API_KEY") {
            self.secrets.openai_api_key = Some(key);
        }
        if let Some(key) = read("DOCSMITH_LLM_API_KEY") {
            self.secrets.llm_api_key = Some(key);
        }
    }
}
