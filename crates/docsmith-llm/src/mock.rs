//! Test-only mock provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::LlmError;
use crate::provider::{EmbedMode, EmbeddingProvider, LlmProvider, Message};

/// Scripted chat replies plus keyword-driven embeddings.
///
/// Embeddings are built from `keyword_axes`: each axis is a keyword, and a
/// text gets `1.0` on every axis whose keyword it contains (case-insensitive).
/// Texts that match nothing get `default_embedding`.
#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub fail_chat: bool,
    /// Chat fails when the last user message contains this marker.
    pub fail_chat_on: Option<String>,
    pub keyword_axes: Vec<String>,
    pub default_embedding: Vec<f32>,
    pub overrides: HashMap<String, Vec<f32>>,
    pub fail_embed: bool,
    pub fail_query_embed: bool,
    embed_calls: Arc<AtomicUsize>,
    chat_calls: Arc<AtomicUsize>,
    chat_history: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            fail_chat: false,
            fail_chat_on: None,
            keyword_axes: Vec::new(),
            default_embedding: vec![0.1; 4],
            overrides: HashMap::new(),
            fail_embed: false,
            fail_query_embed: false,
            embed_calls: Arc::new(AtomicUsize::new(0)),
            chat_calls: Arc::new(AtomicUsize::new(0)),
            chat_history: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_keyword_axes<I, S>(mut self, axes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keyword_axes = axes.into_iter().map(Into::into).collect();
        self.default_embedding = vec![0.0; self.keyword_axes.len()];
        self
    }

    #[must_use]
    pub fn with_override(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.overrides.insert(text.into(), vector);
        self
    }

    #[must_use]
    pub fn with_failing_queries(mut self) -> Self {
        self.fail_query_embed = true;
        self
    }

    #[must_use]
    pub fn with_chat_failure_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_chat_on = Some(marker.into());
        self
    }

    /// Number of `embed_batch` calls made so far.
    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Number of `chat` calls made so far.
    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    /// Messages of every `chat` call so far, oldest first.
    #[must_use]
    pub fn chat_history(&self) -> Vec<Vec<Message>> {
        self.chat_history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.overrides.get(text) {
            return v.clone();
        }
        if self.keyword_axes.is_empty() {
            return self.default_embedding.clone();
        }
        let lower = text.to_lowercase();
        let vector: Vec<f32> = self
            .keyword_axes
            .iter()
            .map(|k| {
                if lower.contains(&k.to_lowercase()) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        if vector.iter().all(|x| *x == 0.0) {
            self.default_embedding.clone()
        } else {
            vector
        }
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut history) = self.chat_history.lock() {
            history.push(messages.to_vec());
        }
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        if let Some(marker) = &self.fail_chat_on
            && messages.iter().any(|m| m.content.contains(marker.as_str()))
        {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self
            .responses
            .lock()
            .map_err(|e| LlmError::Other(e.to_string()))?;
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

impl EmbeddingProvider for MockProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed || (mode == EmbedMode::Query && self.fail_query_embed) {
            return Err(LlmError::Unavailable);
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn embedder_name(&self) -> &str {
        "mock"
    }
}
