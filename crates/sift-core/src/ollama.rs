//! Ollama client for embeddings, completion and image captioning. Wraps ollama-rs with a simple API.
//!
//! Every request is bounded by the configured timeout so a stalled server degrades to
//! the caller's fallback instead of hanging the query loop.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::generation::images::Image;
use ollama_rs::Ollama;
use thiserror::Error;

use crate::config::Config;
use crate::llm::{Captioner, LanguageModel, LlmError};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";
pub const DEFAULT_CAPTION_MODEL: &str = "llava";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const CAPTION_PROMPT: &str =
    "Describe this image in one short sentence, as a caption. Reply with the caption only.";
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Thin wrapper around Ollama for embedding, completion and captioning.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
    chat_model: String,
    caption_model: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create from URL string, e.g. `http://localhost:11434`.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        let inner = Ollama::try_new(url).map_err(OllamaError::ParseUrl)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            caption_model: DEFAULT_CAPTION_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        })
    }

    /// URL, models and timeout from the persisted config.
    pub fn from_config(config: &Config) -> Result<Self, OllamaError> {
        Ok(Self::from_url(&config.ollama_url)?
            .with_embed_model(&config.embed_model)
            .with_chat_model(&config.chat_model)
            .with_caption_model(&config.caption_model)
            .with_timeout(config.timeout()))
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the vision model used for captions (e.g. `llava`, `moondream`).
    pub fn with_caption_model(mut self, model: impl Into<String>) -> Self {
        self.caption_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True when the server answers a model listing within a few seconds.
    pub async fn is_available(&self) -> bool {
        match tokio::time::timeout(PROBE_TIMEOUT, self.inner.list_local_models()).await {
            Ok(Ok(models)) => {
                tracing::debug!(count = models.len(), "ollama reachable");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "ollama not reachable");
                false
            }
            Err(_) => {
                tracing::warn!("ollama probe timed out");
                false
            }
        }
    }

    /// Embed a single string. Returns the embedding vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, OllamaError> {
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Single(text.to_string()),
        );
        let res = self
            .bounded(self.inner.generate_embeddings(req))
            .await?
            .map_err(OllamaError::Request)?;
        Ok(res.embeddings.into_iter().next().unwrap_or_default())
    }

    /// Embed multiple strings in one call. Returns one embedding per input.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OllamaError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );
        let res = self
            .bounded(self.inner.generate_embeddings(req))
            .await?
            .map_err(OllamaError::Request)?;
        if res.embeddings.len() != texts.len() {
            return Err(OllamaError::EmbeddingCount {
                expected: texts.len(),
                got: res.embeddings.len(),
            });
        }
        Ok(res.embeddings)
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: Option<&str>,
        images: Vec<Image>,
    ) -> Result<String, OllamaError> {
        let mut req = GenerationRequest::new(model.to_string(), prompt.to_string());
        if let Some(system) = system {
            req = req.system(system.to_string());
        }
        if !images.is_empty() {
            req = req.images(images);
        }
        let res = self
            .bounded(self.inner.generate(req))
            .await?
            .map_err(OllamaError::Request)?;
        Ok(res.response.trim().to_string())
    }

    async fn bounded<F: Future>(&self, fut: F) -> Result<F::Output, OllamaError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| OllamaError::Timeout(self.timeout))
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let text = self
            .generate(&self.chat_model, prompt, Some(system), Vec::new())
            .await?;
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl Captioner for OllamaClient {
    async fn caption(&self, image: &Path) -> Result<String, LlmError> {
        let bytes = tokio::fs::read(image).await?;
        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        let images = vec![Image::from_base64(b64.as_str())];
        Ok(self
            .generate(&self.caption_model, CAPTION_PROMPT, None, images)
            .await?)
    }
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
    #[error("Ollama request timed out after {0:?}")]
    Timeout(Duration),
    #[error("expected {expected} embeddings, got {got}")]
    EmbeddingCount { expected: usize, got: usize },
}

impl From<OllamaError> for LlmError {
    fn from(e: OllamaError) -> Self {
        match e {
            OllamaError::Timeout(d) => LlmError::Timeout(d),
            OllamaError::ParseUrl(e) => LlmError::Unavailable(e.to_string()),
            other => LlmError::Request(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_applies_models() {
        let mut config = Config::default();
        config.chat_model = "mistral".into();
        config.timeout_secs = 7;
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.chat_model, "mistral");
        assert_eq!(client.embed_model, DEFAULT_EMBED_MODEL);
        assert_eq!(client.timeout, Duration::from_secs(7));
    }

    #[test]
    fn bad_url_is_rejected() {
        assert!(OllamaClient::from_url("not a url").is_err());
    }

    #[tokio::test]
    async fn timeout_maps_to_llm_timeout() {
        let client = OllamaClient::from_url(DEFAULT_BASE_URL)
            .unwrap()
            .with_timeout(Duration::from_millis(10));
        let err = client
            .bounded(tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(LlmError::from(err), LlmError::Timeout(_)));
    }
}
