//! Deterministic local embedder used when no remote provider is reachable.

use crate::error::LlmError;
use crate::provider::{EmbedMode, EmbeddingProvider};

pub const DEFAULT_DIMENSIONS: usize = 128;
const MAX_CHARS: usize = 4096;

/// Buckets characters by position and L2-normalizes the result.
///
/// Vectors carry almost no semantics; they exist so retrieval degrades
/// instead of failing when the real provider is down.
#[derive(Debug, Clone, Copy)]
pub struct HashedEmbedder {
    dimensions: usize,
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashedEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for (i, ch) in text.chars().take(MAX_CHARS).enumerate() {
            vector[i % self.dimensions] += (u32::from(ch) % 97) as f32 / 97.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl EmbeddingProvider for HashedEmbedder {
    async fn embed_batch(
        &self,
        texts: &[String],
        _mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn embedder_name(&self) -> &str {
        "hashed"
    }
}
