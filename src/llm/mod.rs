//! Language-model collaborator.
//!
//! [`LanguageModel`] is the seam every generator and the classifier depend on.
//! [`OpenRouterClient`] talks to an OpenAI-compatible chat completions API.

pub mod openrouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

pub use openrouter::OpenRouterClient;

/// Which configured model serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    /// Classification and perception analysis.
    Classification,
    /// Inner thoughts of a monologue.
    Thinking,
    /// Public-facing text: responses and manifests.
    Generation,
    /// Image description.
    Vision,
}

/// A single blocking completion round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub role: ModelRole,
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(role: ModelRole, prompt: impl Into<String>) -> Self {
        Self {
            role,
            prompt: prompt.into(),
            system: None,
            temperature: 0.7,
            max_tokens: 500,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// The language-model service.
///
/// Implementations bound every call by a timeout and never retry; a failed
/// call is reported once and the caller applies its fallback.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a text prompt. A blank completion is an error.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;

    /// Describe the image at `url` following `prompt`.
    async fn analyze_image(&self, url: &str, prompt: &str) -> Result<String, LlmError>;
}
