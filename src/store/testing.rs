//! A store that fails on demand, for tests.

use super::{MemoryStore, Store, StoreResult};
use crate::error::StoreError;
use crate::models::{
    AgentResult, AnalyzerVariant, PatternMatch, ReferencePattern, ReviewSnapshot, ReviewStatus,
    Stats, Submission,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

const ALWAYS: usize = usize::MAX;

/// A [`MemoryStore`] whose result inserts or pattern searches can be made
/// to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_variant: Option<AnalyzerVariant>,
    remaining_failures: AtomicUsize,
    failing_search: bool,
    result_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every result insert for `variant` fails.
    pub fn rejecting_results_for(self, variant: AnalyzerVariant) -> Self {
        self.dropping_results_for(variant, ALWAYS)
    }

    /// The first `times` result inserts for `variant` fail, later ones pass.
    pub fn dropping_results_for(mut self, variant: AnalyzerVariant, times: usize) -> Self {
        self.failing_variant = Some(variant);
        self.remaining_failures = AtomicUsize::new(times);
        self
    }

    /// Every pattern search fails.
    pub fn failing_search(mut self) -> Self {
        self.failing_search = true;
        self
    }

    /// Result inserts attempted so far, failed ones included.
    pub fn result_attempts(&self) -> usize {
        self.result_attempts.load(Ordering::SeqCst)
    }

    fn should_fail(&self, variant: AnalyzerVariant) -> bool {
        if self.failing_variant != Some(variant) {
            return false;
        }
        self.remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                ALWAYS => Some(ALWAYS),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<i64> {
        self.inner.insert_submission(submission).await
    }

    async fn create_review(&self, submission_id: i64, review_id: &str) -> StoreResult<DateTime<Utc>> {
        self.inner.create_review(submission_id, review_id).await
    }

    async fn insert_agent_result(&self, review_id: &str, result: &AgentResult) -> StoreResult<()> {
        self.result_attempts.fetch_add(1, Ordering::SeqCst);
        if self.should_fail(result.variant) {
            return Err(StoreError::Database("disk I/O error".to_string()));
        }
        self.inner.insert_agent_result(review_id, result).await
    }

    async fn update_review_terminal(
        &self,
        review_id: &str,
        status: ReviewStatus,
        total_issues: usize,
    ) -> StoreResult<bool> {
        self.inner
            .update_review_terminal(review_id, status, total_issues)
            .await
    }

    async fn get_review(&self, review_id: &str) -> StoreResult<Option<ReviewSnapshot>> {
        self.inner.get_review(review_id).await
    }

    async fn search_patterns(
        &self,
        query_text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> StoreResult<Vec<PatternMatch>> {
        if self.failing_search {
            return Err(StoreError::Database("no such table: reference_patterns".to_string()));
        }
        self.inner.search_patterns(query_text, embedding, limit).await
    }

    async fn insert_pattern(&self, pattern: &ReferencePattern) -> StoreResult<i64> {
        self.inner.insert_pattern(pattern).await
    }

    async fn stats(&self) -> StoreResult<Stats> {
        self.inner.stats().await
    }
}
