//! Model provider abstraction.
//!
//! A [`ModelProvider`] is the single seam to the model-serving runtime. It
//! exposes the four capabilities the pipeline needs: catalog listing,
//! embedding, one-shot generation, and streaming generation.
//!
//! Callers never pass model names around as loose strings. A model is
//! resolved once, at selection time, into a handle:
//! - [`ModelHandle`] — a generative model (condensation and answers);
//! - [`EmbeddingHandle`] — an embedding model, pinned by the index it built.
//!
//! Use [`create_provider`] to build the provider named in the configuration.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::config::ProviderConfig;
use crate::error::{RagError, Result};
use crate::ollama::OllamaProvider;

/// Lazy, ordered sequence of generated text fragments.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Input to a generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    /// System instructions, sent separately when the backend supports it.
    pub system: Option<String>,
    pub text: String,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            system: None,
            text: text.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the provider identifier (e.g. `"ollama"`).
    fn name(&self) -> &str;

    /// Model names in the order the service reports them.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// One vector per input text, in input order.
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Non-streaming completion.
    async fn generate(&self, model: &str, prompt: &Prompt) -> Result<String>;

    /// Streaming completion. Fragments arrive in emission order; the stream
    /// ends when the model signals completion.
    async fn generate_stream(&self, model: &str, prompt: &Prompt) -> Result<FragmentStream>;
}

/// A selected generative model.
#[derive(Clone)]
pub struct ModelHandle {
    provider: Arc<dyn ModelProvider>,
    model: String,
}

impl ModelHandle {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.provider.generate(&self.model, prompt).await
    }

    pub async fn generate_stream(&self, prompt: &Prompt) -> Result<FragmentStream> {
        self.provider.generate_stream(&self.model, prompt).await
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// A selected embedding model.
#[derive(Clone)]
pub struct EmbeddingHandle {
    provider: Arc<dyn ModelProvider>,
    model: String,
    batch_size: usize,
}

impl EmbeddingHandle {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>, batch_size: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed texts in batches, preserving input order.
    ///
    /// Any provider failure, or a response with the wrong number of vectors,
    /// is reported as [`RagError::EmbeddingServiceUnavailable`].
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self
                .provider
                .embed(&self.model, batch)
                .await
                .map_err(|e| match e {
                    RagError::EmbeddingServiceUnavailable(_) => e,
                    other => RagError::embedding(other),
                })?;
            if embedded.len() != batch.len() {
                return Err(RagError::EmbeddingServiceUnavailable(format!(
                    "expected {} embeddings from '{}', got {}",
                    batch.len(),
                    self.model,
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("empty embedding response"))
    }
}

impl std::fmt::Debug for EmbeddingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingHandle")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// Create the [`ModelProvider`] named by `config.kind`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"ollama"` | [`OllamaProvider`] |
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>> {
    match config.kind.as_str() {
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => Err(RagError::Config(format!(
            "Unknown provider kind: {}",
            other
        ))),
    }
}
