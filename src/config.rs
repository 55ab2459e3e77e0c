//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.reviewswarm.toml` files. The resulting [`Config`] is built once in
//! `main` and handed to the orchestrator, the inference backends and the
//! store.

use crate::models::AnalyzerVariant;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".reviewswarm.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Inference providers, tried in order.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    /// Reference pattern retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Storage settings.
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            providers: default_providers(),
            retrieval: RetrievalConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Analyzers used when a request does not name any.
    #[serde(default = "default_agents")]
    pub default_agents: Vec<AnalyzerVariant>,

    /// How often the CLI polls a running review, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_agents: default_agents(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_agents() -> Vec<AnalyzerVariant> {
    AnalyzerVariant::ALL.to_vec()
}

fn default_poll_interval() -> u64 {
    1000
}

/// Which HTTP API a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Anthropic,
    Gemini,
}

/// One inference backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Model name sent to the provider.
    pub model: String,

    /// Base URL; each kind has its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Environment variable holding the API key (hosted providers only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds. This is the only bound on how long an
    /// analyzer task can take.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl ProviderConfig {
    fn new(kind: ProviderKind, model: &str, api_key_env: Option<&str>) -> Self {
        Self {
            kind,
            model: model.to_string(),
            url: None,
            api_key_env: api_key_env.map(String::from),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
        }
    }

    /// The base URL to use, falling back to the provider's public endpoint.
    pub fn base_url(&self) -> String {
        if let Some(ref url) = self.url {
            return url.trim_end_matches('/').to_string();
        }
        match self.kind {
            ProviderKind::Ollama => default_ollama_url(),
            ProviderKind::OpenAi => "https://api.openai.com/v1".to_string(),
            ProviderKind::Anthropic => "https://api.anthropic.com/v1".to_string(),
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(ProviderKind::Gemini, "gemini-2.0-flash", Some("GEMINI_API_KEY")),
        ProviderConfig::new(ProviderKind::OpenAi, "gpt-4o-mini", Some("OPENAI_API_KEY")),
        ProviderConfig::new(
            ProviderKind::Anthropic,
            "claude-3-haiku-20240307",
            Some("ANTHROPIC_API_KEY"),
        ),
        ProviderConfig::new(ProviderKind::Ollama, "llama3.2:latest", None),
    ]
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout() -> u64 {
    120
}

/// Reference pattern retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Look up reference patterns before analysis.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum patterns fetched per analyzer.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// How much of the submitted code is used as the query.
    #[serde(default = "default_query_chars")]
    pub query_chars: usize,

    /// Ollama embedding model. Without one, retrieval is lexical only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Ollama URL used for embeddings.
    #[serde(default = "default_ollama_url")]
    pub embedding_url: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: default_limit(),
            query_chars: default_query_chars(),
            embedding_model: None,
            embedding_url: default_ollama_url(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    3
}

fn default_query_chars() -> usize {
    500
}

/// Where reviews are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local; nothing survives exit.
    Memory,
    /// SQLite database file.
    Sqlite,
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Database file for the sqlite backend.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_db_path(),
        }
    }
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reviewswarm.db")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(backend) = args.store {
            self.store.backend = backend;
        }
        if let Some(ref path) = args.db {
            self.store.path = path.clone();
        }
        if let Some(timeout) = args.timeout {
            for provider in &mut self.providers {
                provider.timeout_seconds = timeout;
            }
        }
        if let Some(ref model) = args.embedding_model {
            self.retrieval.embedding_model = Some(model.clone());
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
