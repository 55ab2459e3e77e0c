//! Terminal transition of a review.

use crate::error::StoreError;
use crate::models::{AgentResult, AnalyzerVariant, ReviewStatus};
use crate::store::Store;
use std::sync::Arc;
use tracing::{debug, error, info};

/// What [`Aggregator::finalize`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The review moved from running to completed.
    Completed { total_issues: usize },
    /// The review was already terminal; nothing changed.
    AlreadyCompleted,
    /// Some requested variants have no stored result; the review stays
    /// running.
    Incomplete { missing: Vec<AnalyzerVariant> },
}

/// Issues across completed results. Failed results contribute nothing.
pub fn total_issues(results: &[AgentResult]) -> usize {
    results.iter().map(AgentResult::counted_issues).sum()
}

pub struct Aggregator {
    store: Arc<dyn Store>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Mark the review completed once every `expected` variant has a stored
    /// result. The total is counted over the stored results, so it always
    /// matches what a poll returns. Safe to call more than once.
    pub async fn finalize(
        &self,
        review_id: &str,
        expected: &[AnalyzerVariant],
    ) -> Result<Transition, StoreError> {
        let snapshot = self
            .store
            .get_review(review_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("review {}", review_id)))?;

        if snapshot.is_completed() {
            debug!("Review {} was already completed", review_id);
            return Ok(Transition::AlreadyCompleted);
        }

        let mut missing: Vec<AnalyzerVariant> = Vec::new();
        for variant in expected {
            if !missing.contains(variant) && !snapshot.results.iter().any(|r| r.variant == *variant) {
                missing.push(*variant);
            }
        }
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|v| v.as_str()).collect();
            error!(
                "Review {} left running: no stored result for {}",
                review_id,
                names.join(", ")
            );
            return Ok(Transition::Incomplete { missing });
        }

        let total = total_issues(&snapshot.results);
        let applied = self
            .store
            .update_review_terminal(review_id, ReviewStatus::Completed, total)
            .await?;

        if applied {
            info!("Review {} completed with {} issue(s)", review_id, total);
            Ok(Transition::Completed { total_issues: total })
        } else {
            debug!("Review {} was already completed", review_id);
            Ok(Transition::AlreadyCompleted)
        }
    }
}
