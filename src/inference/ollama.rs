//! Ollama chat and embedding clients.

use super::{post_json, Embedder, InferenceBackend};
use crate::config::ProviderConfig;
use crate::error::InferenceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

fn build_client(timeout_seconds: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// A local (or self-hosted) Ollama server.
pub struct OllamaBackend {
    name: String,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            name: format!("ollama:{}", config.model),
            url: config.base_url(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_seconds: config.timeout_seconds,
            http_client: build_client(config.timeout_seconds),
        }
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let url = format!("{}/api/chat", self.url);

        let request = OllamaChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        debug!("Sending {} byte prompt to {}", prompt.len(), url);

        let response: OllamaChatResponse = post_json(
            self.http_client.post(&url).json(&request),
            &self.url,
            self.timeout_seconds,
        )
        .await?;

        if response.message.content.trim().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(response.message.content)
    }
}

/// Embeds retrieval queries with an Ollama embedding model.
pub struct OllamaEmbedder {
    url: String,
    model: String,
    http_client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(url: &str, model: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            http_client: build_client(30),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let url = format!("{}/api/embeddings", self.url);
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response: OllamaEmbeddingResponse =
            post_json(self.http_client.post(&url).json(&request), &self.url, 30).await?;

        if response.embedding.is_empty() {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(response.embedding)
    }
}
