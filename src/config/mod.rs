mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the merged configuration fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.provider == EmbeddingBackend::Hashed && self.embedding.dimensions == 0 {
            bail!("embedding.dimensions must be greater than zero");
        }
        if self.index.extensions.is_empty() {
            bail!("index.extensions must list at least one file extension");
        }
        if self.store.sqlite_path.trim().is_empty() {
            bail!("store.sqlite_path must not be empty");
        }
        if self.store.qdrant_url.is_some() && self.store.collection.trim().is_empty() {
            bail!("store.collection must not be empty when store.qdrant_url is set");
        }
        if let Some(score) = self.retrieval.min_score
            && !score.is_finite()
        {
            bail!("retrieval.min_score must be a finite number");
        }
        if self.llm.enabled && self.llm.max_tokens == 0 {
            bail!("llm.max_tokens must be greater than zero");
        }
        Ok(())
    }
}
