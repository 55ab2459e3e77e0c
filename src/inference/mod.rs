//! Inference backends and the ordered fallback chain.
//!
//! Every provider implements [`InferenceBackend`]: one prompt in, free-form
//! text out. Analyzers never talk to a provider directly; they go through a
//! [`FallbackChain`], which tries the configured providers strictly in order.

pub mod hosted;
pub mod ollama;

#[cfg(test)]
pub mod testing;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::InferenceError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub use hosted::{AnthropicBackend, GeminiBackend, OpenAiBackend};
pub use ollama::{OllamaBackend, OllamaEmbedder};

/// A text generation capability.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, InferenceError>;
}

/// Turns retrieval queries into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}

/// Providers tried in a fixed priority order; the first success wins.
#[derive(Clone, Default)]
pub struct FallbackChain {
    backends: Vec<Arc<dyn InferenceBackend>>,
}

impl FallbackChain {
    pub fn new(backends: Vec<Arc<dyn InferenceBackend>>) -> Self {
        Self { backends }
    }

    /// Build the chain from config. Hosted providers whose API key variable
    /// is unset are left out.
    pub fn from_config(providers: &[ProviderConfig]) -> Self {
        let mut backends: Vec<Arc<dyn InferenceBackend>> = Vec::new();

        for provider in providers {
            let api_key = match provider.api_key_env.as_deref() {
                Some(var) => match std::env::var(var) {
                    Ok(key) if !key.is_empty() => Some(key),
                    _ => {
                        if provider.kind != ProviderKind::Ollama {
                            warn!(
                                "Skipping {:?} provider: {} is not set",
                                provider.kind, var
                            );
                            continue;
                        }
                        None
                    }
                },
                None => None,
            };

            let backend: Arc<dyn InferenceBackend> = match provider.kind {
                ProviderKind::Ollama => Arc::new(OllamaBackend::new(provider)),
                ProviderKind::OpenAi => {
                    Arc::new(OpenAiBackend::new(provider, api_key.unwrap_or_default()))
                }
                ProviderKind::Anthropic => {
                    Arc::new(AnthropicBackend::new(provider, api_key.unwrap_or_default()))
                }
                ProviderKind::Gemini => {
                    Arc::new(GeminiBackend::new(provider, api_key.unwrap_or_default()))
                }
            };
            debug!("Configured provider {}", backend.name());
            backends.push(backend);
        }

        Self::new(backends)
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Try each backend in order and return the first successful response.
    pub async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        if self.backends.is_empty() {
            return Err(InferenceError::NoProviders);
        }

        let mut failures = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            match backend.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("{} call failed: {}", backend.name(), e);
                    failures.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        Err(InferenceError::AllFailed(failures))
    }
}

/// Map a reqwest error onto the inference taxonomy. The request URL is
/// dropped from the message since it may carry credentials.
pub(crate) fn classify_request_error(
    err: reqwest::Error,
    url: &str,
    timeout_seconds: u64,
) -> InferenceError {
    if err.is_timeout() {
        InferenceError::Timeout(timeout_seconds)
    } else if err.is_connect() {
        InferenceError::Connect(url.to_string())
    } else {
        InferenceError::Http(err.without_url().to_string())
    }
}

/// Shared POST-and-decode helper for the JSON provider APIs.
pub(crate) async fn post_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    url: &str,
    timeout_seconds: u64,
) -> Result<T, InferenceError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_request_error(e, url, timeout_seconds))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(InferenceError::Api { status, body });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| InferenceError::Http(format!("Failed to parse response: {}", e)))
}
