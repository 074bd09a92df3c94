use std::future::Future;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Embedding regime. Stored sections and search queries may be embedded
/// differently by the same model family, so callers must pick the right one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    #[default]
    Document,
    Query,
}

impl EmbedMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Query => "query",
        }
    }
}

/// Maps text to fixed-length vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts in one provider call. The output has the same
    /// length and order as `texts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails or returns a different number of vectors.
    fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails or returns no vector.
    fn embed(
        &self,
        text: &str,
        mode: EmbedMode,
    ) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send {
        let input = vec![text.to_owned()];
        async move {
            let mut vectors = self.embed_batch(&input, mode).await?;
            vectors.pop().ok_or_else(|| LlmError::EmptyResponse {
                provider: self.embedder_name().to_owned(),
            })
        }
    }

    fn embedder_name(&self) -> &str;
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and return the assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(&self, messages: &[Message]) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Like [`chat`](Self::chat), but asks the backend for a JSON object reply
    /// where it supports a JSON response mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails.
    fn chat_json(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<String, LlmError>> + Send {
        self.chat(messages)
    }

    /// Request a reply shaped like `T` and parse it.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails or the reply does not parse as `T`.
    fn chat_typed<T>(&self, messages: &[Message]) -> impl Future<Output = Result<T, LlmError>> + Send
    where
        T: DeserializeOwned + JsonSchema + Send + 'static,
        Self: Sized,
    {
        let mut prepared = Vec::with_capacity(messages.len() + 1);
        let instruction = schema_instruction::<T>();
        prepared.extend_from_slice(messages);
        async move {
            prepared.insert(0, Message::new(Role::System, instruction?));
            let raw = self.chat_json(&prepared).await?;
            parse_structured(&raw)
        }
    }

    fn name(&self) -> &str;
}

/// System instruction carrying the JSON schema the reply must follow.
///
/// # Errors
///
/// Returns an error if the schema cannot be serialized.
pub fn schema_instruction<T: JsonSchema>() -> Result<String, LlmError> {
    let schema = schemars::schema_for!(T);
    let schema = serde_json::to_string(&schema)?;
    Ok(format!(
        "Respond with ONLY a JSON object matching this JSON schema, no prose:\n{schema}"
    ))
}

/// Parse a model reply as `T`, tolerating a surrounding Markdown code fence.
///
/// # Errors
///
/// Returns [`LlmError::StructuredParse`] if the body is not valid JSON for `T`.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    serde_json::from_str::<T>(strip_code_fences(raw))
        .map_err(|e| LlmError::StructuredParse(e.to_string()))
}

/// Remove a leading ```` ```lang ```` line and trailing fence if present.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Output {
        value: String,
    }

    #[test]
    fn strip_fences_plain_json_untouched() {
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn strip_fences_with_language_tag() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn strip_fences_without_language_tag() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn parse_structured_ok() {
        let out: Output = parse_structured("```json\n{\"value\":\"x\"}\n```").unwrap();
        assert_eq!(out.value, "x");
    }

    #[test]
    fn parse_structured_malformed_is_structured_parse_error() {
        let err = parse_structured::<Output>("not json").unwrap_err();
        assert!(matches!(err, LlmError::StructuredParse(_)));
    }

    #[test]
    fn schema_instruction_mentions_fields() {
        let text = schema_instruction::<Output>().unwrap();
        assert!(text.contains("\"value\""));
    }

    #[test]
    fn embed_mode_serde_lowercase() {
        assert_eq!(serde_json::to_string(&EmbedMode::Query).unwrap(), "\"query\"");
        assert_eq!(EmbedMode::Document.as_str(), "document");
    }
}
