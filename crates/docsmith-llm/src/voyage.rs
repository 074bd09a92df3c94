use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::openai::{EmbeddingData, ordered_embeddings};
use crate::provider::{EmbedMode, EmbeddingProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";
pub const DEFAULT_MODEL: &str = "voyage-code-3";

/// Voyage AI embeddings with the document/query `input_type` distinction.
pub struct VoyageProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for VoyageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoyageProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Clone for VoyageProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
        }
    }
}

impl VoyageProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: String, mut base_url: String, model: String) -> Result<Self, LlmError> {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client: crate::http::default_client()?,
            api_key,
            base_url,
            model,
        })
    }
}

impl EmbeddingProvider for VoyageProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = VoyageRequest {
            input: texts,
            model: &self.model,
            input_type: mode.as_str(),
        };

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
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::Other(
                "Voyage rejected the API key (status 401)".into(),
            ));
        }
        if !status.is_success() {
            tracing::error!("Voyage embedding API error {status}: {text}");
            return Err(LlmError::Other(format!(
                "Voyage embedding request failed (status {status})"
            )));
        }

        let resp: VoyageResponse = serde_json::from_str(&text)?;
        tracing::debug!(
            model = %self.model,
            mode = mode.as_str(),
            inputs = texts.len(),
            tokens = resp.usage.map_or(0, |u| u.total_tokens),
            "voyage embeddings"
        );
        ordered_embeddings(resp.data, texts.len(), "voyage")
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn embedder_name(&self) -> &str {
        "voyage"
    }
}

#[derive(Serialize)]
struct VoyageRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: &'a str,
}

#[derive(Deserialize)]
struct VoyageResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<VoyageUsage>,
}

#[derive(Deserialize)]
struct VoyageUsage {
    #[serde(default)]
    total_tokens: u64,
}
