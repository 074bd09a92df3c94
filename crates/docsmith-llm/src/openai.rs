use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{EmbedMode, EmbeddingProvider, LlmProvider, Message, Role};

/// OpenAI-compatible chat and embeddings client.
///
/// Works against any endpoint that speaks the `/chat/completions` and
/// `/embeddings` dialect (OpenAI, Fireworks, local gateways).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    embedding_model: Option<String>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl Clone for OpenAiProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            embedding_model: self.embedding_model.clone(),
        }
    }
}

impl OpenAiProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        max_tokens: u32,
        embedding_model: Option<String>,
    ) -> Result<Self, LlmError> {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client: crate::http::default_client()?,
            api_key,
            base_url,
            model,
            max_tokens,
            embedding_model,
        })
    }

    async fn send_chat(&self, messages: &[Message], json_mode: bool) -> Result<String, LlmError> {
        let api_messages = convert_messages(messages);
        let body = ChatRequest {
            model: &self.model,
            messages: &api_messages,
            max_tokens: self.max_tokens,
            temperature: 0.1,
            response_format: json_mode.then_some(ResponseFormat {
                r#type: "json_object",
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }

        if !status.is_success() {
            tracing::error!("OpenAI-compatible API error {status}: {text}");
            return Err(LlmError::Other(format!(
                "chat completion request failed (status {status})"
            )));
        }

        let resp: ChatResponse = serde_json::from_str(&text)?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse {
                provider: "openai".into(),
            })
    }
}

impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.send_chat(messages, false).await
    }

    async fn chat_json(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.send_chat(messages, true).await
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "openai"
    }
}

impl EmbeddingProvider for OpenAiProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        _mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or(LlmError::EmbedUnsupported {
                provider: "openai".into(),
            })?;

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest { input: texts, model };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }

        if !status.is_success() {
            tracing::error!("OpenAI embedding API error {status}: {text}");
            return Err(LlmError::Other(format!(
                "OpenAI embedding request failed (status {status})"
            )));
        }

        let resp: EmbeddingResponse = serde_json::from_str(&text)?;
        ordered_embeddings(resp.data, texts.len(), "openai")
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn embedder_name(&self) -> &str {
        "openai"
    }
}

/// Sort response rows by their `index` and check the count against the request.
pub(crate) fn ordered_embeddings(
    mut data: Vec<EmbeddingData>,
    expected: usize,
    provider: &str,
) -> Result<Vec<Vec<f32>>, LlmError> {
    if data.len() != expected {
        return Err(LlmError::BatchMismatch {
            provider: provider.to_owned(),
            expected,
            got: data.len(),
        });
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

fn convert_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            ApiMessage {
                role,
                content: &msg.content,
            }
        })
        .collect()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    r#type: &'a str,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
pub(crate) struct EmbeddingData {
    pub(crate) embedding: Vec<f32>,
    #[serde(default)]
    pub(crate) index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{http_response, spawn_mock_server};

    fn test_provider() -> OpenAiProvider {
        OpenAiProvider::new(
            "sk-test-key".into(),
            "https://api.fireworks.ai/inference/v1/".into(),
            "accounts/fireworks/models/llama-v3p1-8b-instruct".into(),
            1024,
            Some("text-embedding-3-small".into()),
        )
        .unwrap()
    }

    fn local_provider(port: u16, embedding_model: Option<&str>) -> OpenAiProvider {
        OpenAiProvider::new(
            "k".into(),
            format!("http://127.0.0.1:{port}/v1"),
            "m".into(),
            256,
            embedding_model.map(str::to_owned),
        )
        .unwrap()
    }

    #[test]
    fn new_trims_trailing_slash() {
        let p = test_provider();
        assert_eq!(p.base_url, "https://api.fireworks.ai/inference/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let debug = format!("{:?}", test_provider());
        assert!(!debug.contains("sk-test-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn chat_request_json_mode_serialization() {
        let messages = [ApiMessage {
            role: "user",
            content: "hi",
        }];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            max_tokens: 10,
            temperature: 0.1,
            response_format: Some(ResponseFormat {
                r#type: "json_object",
            }),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"response_format\":{\"type\":\"json_object\"}"));

        let plain = ChatRequest {
            response_format: None,
            ..body
        };
        assert!(!serde_json::to_string(&plain).unwrap().contains("response_format"));
    }

    #[test]
    fn ordered_embeddings_sorts_by_index() {
        let data = vec![
            EmbeddingData {
                embedding: vec![2.0],
                index: 1,
            },
            EmbeddingData {
                embedding: vec![1.0],
                index: 0,
            },
        ];
        let out = ordered_embeddings(data, 2, "openai").unwrap();
        assert_eq!(out, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn ordered_embeddings_count_mismatch() {
        let err = ordered_embeddings(Vec::new(), 1, "openai").unwrap_err();
        assert!(matches!(err, LlmError::BatchMismatch { expected: 1, got: 0, .. }));
    }

    #[tokio::test]
    async fn embed_without_model_returns_error() {
        let p = local_provider(1, None);
        let err = p
            .embed_batch(&["x".to_owned()], EmbedMode::Document)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("embedding not supported"));
    }

    #[tokio::test]
    async fn embed_batch_against_mock_server() {
        let body = r#"{"data":[{"embedding":[0.5,0.5],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#;
        let (port, _handle) = spawn_mock_server(vec![http_response(200, body)]).await;
        let p = local_provider(port, Some("embed"));

        let texts = vec!["first".to_owned(), "second".to_owned()];
        let out = p.embed_batch(&texts, EmbedMode::Document).await.unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[tokio::test]
    async fn chat_json_returns_content() {
        let body = r#"{"choices":[{"message":{"content":"{\"summary\":\"s\"}"}}]}"#;
        let (port, _handle) = spawn_mock_server(vec![http_response(200, body)]).await;
        let p = local_provider(port, None);

        let out = p
            .chat_json(&[Message::new(Role::User, "extract")])
            .await
            .unwrap();
        assert_eq!(out, "{\"summary\":\"s\"}");
    }

    #[tokio::test]
    async fn chat_rate_limited_maps_error() {
        let (port, _handle) = spawn_mock_server(vec![http_response(429, "{}")]).await;
        let p = local_provider(port, None);
        let err = p.chat(&[Message::new(Role::User, "x")]).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited));
    }

    #[tokio::test]
    async fn chat_server_error_maps_other() {
        let (port, _handle) = spawn_mock_server(vec![http_response(500, "boom")]).await;
        let p = local_provider(port, None);
        let err = p.chat(&[Message::new(Role::User, "x")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Other(_)));
    }

    #[tokio::test]
    async fn chat_unreachable_endpoint_errors() {
        let p = local_provider(1, None);
        assert!(p.chat(&[Message::new(Role::User, "x")]).await.is_err());
    }
}
