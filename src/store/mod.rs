//! Durable storage for submissions, reviews, agent results and reference
//! patterns.
//!
//! The orchestration layer only ever talks to [`Store`]; the SQLite backend
//! is used by the CLI, the in-memory backend by tests and throwaway runs.

mod memory;
mod schema;
mod sqlite;

#[cfg(test)]
pub mod testing;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::models::{
    AgentResult, PatternMatch, ReferencePattern, ReviewSnapshot, ReviewStatus, Stats, Submission,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operations needed by the review pipeline.
///
/// Implementations must be safe to share across concurrently running
/// analyzer tasks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a submission and return its id.
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<i64>;

    /// Create a review in the `running` state. Returns its creation time.
    async fn create_review(&self, submission_id: i64, review_id: &str) -> StoreResult<DateTime<Utc>>;

    /// Append one agent result. Results are never updated afterwards, and a
    /// second result for the same variant fails with
    /// [`StoreError::Duplicate`].
    async fn insert_agent_result(&self, review_id: &str, result: &AgentResult) -> StoreResult<()>;

    /// Move a review to its terminal state. Only applies while the review
    /// is still running; returns whether anything changed.
    async fn update_review_terminal(
        &self,
        review_id: &str,
        status: ReviewStatus,
        total_issues: usize,
    ) -> StoreResult<bool>;

    /// The review joined with its submission and the results so far.
    async fn get_review(&self, review_id: &str) -> StoreResult<Option<ReviewSnapshot>>;

    /// Vector search when `embedding` is given, lexical search otherwise.
    async fn search_patterns(
        &self,
        query_text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> StoreResult<Vec<PatternMatch>>;

    /// Add a reference pattern to the retrieval corpus.
    async fn insert_pattern(&self, pattern: &ReferencePattern) -> StoreResult<i64>;

    async fn stats(&self) -> StoreResult<Stats>;
}

/// Open the configured backend.
pub async fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            info!("Opening SQLite store at {}", config.path.display());
            Ok(Arc::new(SqliteStore::open(&config.path).await?))
        }
    }
}
