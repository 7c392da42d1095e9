//! Collaborator interfaces: captioning, text completion.
//!
//! Everything that talks to a model goes through these traits so the engine and the
//! ingestor get their collaborators at construction and tests can swap in fakes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

/// Produces a short natural-language description of one image.
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, image: &Path) -> Result<String, LlmError>;
}

/// Single-turn text completion with a system instruction.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

/// Captioner used when no vision model is reachable: every image gets an empty caption.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCaptioner;

#[async_trait]
impl Captioner for NoCaptioner {
    async fn caption(&self, _image: &Path) -> Result<String, LlmError> {
        Err(LlmError::Unavailable("no captioning model configured".into()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(String),
    #[error("could not read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("model returned an empty response")]
    EmptyResponse,
}
