//! Error types.
//!
//! Library-level failures are typed with `thiserror`; the CLI layer in
//! `main.rs` wraps them in `anyhow` with context.

use thiserror::Error;

/// Failures talking to durable storage.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Query or connection failure in the backing database.
    #[error("Database operation failed: {0}")]
    Database(String),

    /// Stored JSON could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A row the operation depends on does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The row already exists and must not be written twice.
    #[error("Already exists: {0}")]
    Duplicate(String),

    /// The background connection has shut down.
    #[error("Store connection closed")]
    Closed,
}

impl StoreError {
    /// Whether repeating the same call can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Duplicate(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::ConnectionClosed => StoreError::Closed,
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Failures from an inference backend or the fallback chain.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Request failed: {0}")]
    Http(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Cannot connect to {0}")]
    Connect(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Provider returned no text")]
    EmptyResponse,

    #[error("No AI provider available")]
    NoProviders,

    #[error("All providers failed: {}", .0.join("; "))]
    AllFailed(Vec<String>),
}

/// Failures surfaced by the orchestration entry points.
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Review not found: {0}")]
    NotFound(String),

    #[error("Invalid review request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
