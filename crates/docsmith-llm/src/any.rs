use crate::LlmError;
use crate::hashed::HashedEmbedder;
#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{EmbedMode, EmbeddingProvider, LlmProvider, Message};
use crate::voyage::VoyageProvider;

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given closure for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::OpenAi($p) => $expr,
            AnyProvider::Voyage($p) => $expr,
            AnyProvider::Hashed($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    Voyage(VoyageProvider),
    Hashed(HashedEmbedder),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl AnyProvider {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai",
            Self::Voyage(_) => "voyage",
            Self::Hashed(_) => "hashed",
            #[cfg(feature = "mock")]
            Self::Mock(_) => "mock",
        }
    }
}

impl EmbeddingProvider for AnyProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        delegate_provider!(self, |p| p.embed_batch(texts, mode).await)
    }

    fn embedder_name(&self) -> &str {
        delegate_provider!(self, |p| p.embedder_name())
    }
}

impl LlmProvider for AnyProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        match self {
            Self::OpenAi(p) => p.chat(messages).await,
            #[cfg(feature = "mock")]
            Self::Mock(p) => p.chat(messages).await,
            Self::Voyage(_) | Self::Hashed(_) => Err(LlmError::ChatUnsupported {
                provider: self.kind().into(),
            }),
        }
    }

    async fn chat_json(&self, messages: &[Message]) -> Result<String, LlmError> {
        match self {
            Self::OpenAi(p) => p.chat_json(messages).await,
            #[cfg(feature = "mock")]
            Self::Mock(p) => p.chat_json(messages).await,
            Self::Voyage(_) | Self::Hashed(_) => Err(LlmError::ChatUnsupported {
                provider: self.kind().into(),
            }),
        }
    }

    fn name(&self) -> &str {
        self.kind()
    }
}
