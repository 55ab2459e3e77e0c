//! Hosted provider clients: OpenAI-compatible chat, Anthropic messages
//! and Gemini generateContent.

use super::{post_json, InferenceBackend};
use crate::config::ProviderConfig;
use crate::error::InferenceError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Connection settings shared by every hosted client.
struct Endpoint {
    name: String,
    url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl Endpoint {
    fn new(prefix: &str, config: &ProviderConfig, api_key: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: format!("{}:{}", prefix, config.model),
            url: config.base_url(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_seconds: config.timeout_seconds,
            http_client,
        }
    }
}

fn non_empty(text: Option<String>) -> Result<String, InferenceError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(InferenceError::EmptyResponse),
    }
}

// ── OpenAI ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

/// Any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiBackend {
    endpoint: Endpoint,
}

impl OpenAiBackend {
    pub fn new(config: &ProviderConfig, api_key: String) -> Self {
        Self {
            endpoint: Endpoint::new("openai", config, api_key),
        }
    }
}

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let ep = &self.endpoint;
        let url = format!("{}/chat/completions", ep.url);
        let payload = json!({
            "model": ep.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": ep.temperature,
            "max_tokens": ep.max_tokens,
        });

        let request = ep
            .http_client
            .post(&url)
            .bearer_auth(&ep.api_key)
            .json(&payload);
        let response: OpenAiResponse = post_json(request, &ep.url, ep.timeout_seconds).await?;

        non_empty(response.choices.into_iter().next().and_then(|c| c.message.content))
    }
}

// ── Anthropic ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API.
pub struct AnthropicBackend {
    endpoint: Endpoint,
}

impl AnthropicBackend {
    pub fn new(config: &ProviderConfig, api_key: String) -> Self {
        Self {
            endpoint: Endpoint::new("anthropic", config, api_key),
        }
    }
}

#[async_trait]
impl InferenceBackend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let ep = &self.endpoint;
        let url = format!("{}/messages", ep.url);
        let payload = json!({
            "model": ep.model,
            "max_tokens": ep.max_tokens,
            "temperature": ep.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let request = ep
            .http_client
            .post(&url)
            .header("x-api-key", &ep.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload);
        let response: AnthropicResponse = post_json(request, &ep.url, ep.timeout_seconds).await?;

        non_empty(response.content.into_iter().find_map(|block| block.text))
    }
}

// ── Gemini ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

/// Google Gemini `generateContent`.
pub struct GeminiBackend {
    endpoint: Endpoint,
}

impl GeminiBackend {
    pub fn new(config: &ProviderConfig, api_key: String) -> Self {
        Self {
            endpoint: Endpoint::new("gemini", config, api_key),
        }
    }
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let ep = &self.endpoint;
        let url = format!("{}/models/{}:generateContent", ep.url, ep.model);
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": ep.temperature,
                "maxOutputTokens": ep.max_tokens,
            }
        });

        let request = ep
            .http_client
            .post(&url)
            .header("x-goog-api-key", &ep.api_key)
            .json(&payload);
        let response: GeminiResponse = post_json(request, &ep.url, ep.timeout_seconds).await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default();
        non_empty(Some(text))
    }
}
