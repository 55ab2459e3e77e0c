//! Hybrid retrieval of reference patterns.
//!
//! With an embedding the store ranks patterns by vector similarity; without
//! one it falls back to lexical containment. The [`Retriever`] decides which
//! mode applies and never lets a retrieval failure reach an analyzer.

pub mod ranking;

use crate::config::RetrievalConfig;
use crate::error::StoreError;
use crate::inference::Embedder;
use crate::models::PatternMatch;
use crate::store::Store;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces contextual hints for analyzers. Read-only and shareable.
pub struct Retriever {
    store: Arc<dyn Store>,
    embedder: Option<Arc<dyn Embedder>>,
    limit: usize,
    query_chars: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn Store>, embedder: Option<Arc<dyn Embedder>>, config: &RetrievalConfig) -> Self {
        Self {
            store,
            embedder,
            limit: config.limit,
            query_chars: config.query_chars,
        }
    }

    /// Search the pattern corpus.
    pub async fn search(
        &self,
        query_text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<PatternMatch>, StoreError> {
        self.store.search_patterns(query_text, embedding, limit).await
    }

    /// Reference patterns for a submission. Any failure degrades to fewer
    /// (or no) hints rather than an error.
    pub async fn context_for(&self, code: &str) -> Vec<PatternMatch> {
        let query: String = code.chars().take(self.query_chars).collect();

        let embedding = match self.embedder {
            Some(ref embedder) => match embedder.embed(&query).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!("Embedding failed, using lexical search: {}", e);
                    None
                }
            },
            None => None,
        };

        match self.search(&query, embedding.as_deref(), self.limit).await {
            Ok(matches) => {
                debug!("Retrieved {} reference pattern(s)", matches.len());
                matches
            }
            Err(e) => {
                warn!("Hybrid search failed: {}", e);
                Vec::new()
            }
        }
    }
}
