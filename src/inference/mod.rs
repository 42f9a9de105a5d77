use crate::error::InferenceError;
use crate::region::raster::EncodedImage;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub mod ollama;
#[cfg(test)]
pub(crate) mod scripted;

pub use ollama::OllamaClient;

/// Incremental text of one inference call. Dropping the stream cancels the call.
pub type TextStream = BoxStream<'static, Result<String, InferenceError>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub temperature: f32,
    pub context_length: u32,
    pub seed: i64,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            context_length: 8192,
            seed: 42,
        }
    }
}

/// One unit of work: a prompt plus exactly one encoded image.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub image: EncodedImage,
    pub parameters: GenerationParameters,
}

/// Vision capable text generation endpoint.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Whether the endpoint answers at all. Never fails, unreachable is `false`.
    async fn check_availability(&self) -> bool;

    /// Model identifiers the endpoint can serve. An empty list is a valid answer.
    async fn list_models(&self) -> Result<Vec<String>, InferenceError>;

    /// Start a streaming generation. Resolves once the response headers arrived.
    async fn generate(&self, request: GenerateRequest) -> Result<TextStream, InferenceError>;
}
