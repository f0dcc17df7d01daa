//! OpenRouter chat completions provider.
//!
//! Speaks the OpenAI-compatible `POST {base_url}/chat/completions` protocol
//! with bearer authentication. The HTTP client carries the configured timeout;
//! there is no retry loop, a failed call surfaces once and the caller falls back.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{CompletionRequest, LanguageModel, ModelRole};
use crate::config::{is_real_secret, LlmConfig, ModelsConfig};
use crate::error::LlmError;

/// Vision calls are short descriptions.
const VISION_TEMPERATURE: f64 = 0.5;
const VISION_MAX_TOKENS: u32 = 300;

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    models: ModelsConfig,
}

impl OpenRouterClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = config.api_key.clone().filter(|k| is_real_secret(Some(k)));
        if api_key.is_none() {
            warn!("Language model API key not configured");
        }
        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            models: config.models.clone(),
        })
    }

    /// Model identifier serving `role`.
    pub fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Classification => &self.models.classification,
            ModelRole::Thinking => &self.models.thinking,
            ModelRole::Generation => &self.models.generation,
            ModelRole::Vision => &self.models.vision,
        }
    }

    async fn send(&self, body: Value) -> Result<String, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::NotConfigured)?;
        let endpoint = format!("{}/chat/completions", self.base_url);

        debug!(model = %body["model"], "Chat completion request");
        let response = self
            .http
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| {
            LlmError::Malformed(format!(
                "{} - Body: {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })?;
        extract_content(&json)
    }
}

/// Build the chat completions payload for a text request.
pub(crate) fn completion_body(model: &str, request: &CompletionRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": request.prompt}));

    json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

/// Build the multi-part payload for an image description request.
pub(crate) fn vision_body(model: &str, url: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                {"type": "text", "text": prompt},
                {"type": "image_url", "image_url": {"url": url}}
            ]
        }],
        "temperature": VISION_TEMPERATURE,
        "max_tokens": VISION_MAX_TOKENS,
    })
}

/// Pull `choices[0].message.content` out of a response.
pub(crate) fn extract_content(json: &Value) -> Result<String, LlmError> {
    if let Some(error) = json.get("error") {
        return Err(LlmError::Malformed(format!("provider error: {}", error)));
    }
    let content = json
        .pointer("/choices/0/message/content")
        .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".to_string()))?;
    if content.is_null() {
        return Err(LlmError::EmptyCompletion);
    }
    let text = content
        .as_str()
        .ok_or_else(|| LlmError::Malformed(format!("unexpected content: {}", content)))?
        .trim();
    if text.is_empty() {
        Err(LlmError::EmptyCompletion)
    } else {
        Ok(text.to_string())
    }
}

#[async_trait]
impl LanguageModel for OpenRouterClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = completion_body(self.model_for(request.role), &request);
        self.send(body).await
    }

    async fn analyze_image(&self, url: &str, prompt: &str) -> Result<String, LlmError> {
        let body = vision_body(self.model_for(ModelRole::Vision), url, prompt);
        self.send(body).await
    }
}
