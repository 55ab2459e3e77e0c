//! In-memory store. Nothing survives the process.

use super::{Store, StoreResult};
use crate::error::StoreError;
use crate::models::{
    AgentResult, AnalyzerVariant, PatternMatch, ReferencePattern, ReviewRecord, ReviewSnapshot,
    ReviewStatus, Stats, Submission,
};
use crate::retrieval::ranking::{lexical_matches, rank_by_embedding};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    submissions: Vec<Submission>,
    reviews: HashMap<String, ReviewRecord>,
    results: HashMap<String, Vec<AgentResult>>,
    patterns: Vec<ReferencePattern>,
}

/// A [`Store`] backed by plain collections behind a `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<i64> {
        let mut tables = self.tables.write().await;
        tables.submissions.push(submission.clone());
        Ok(tables.submissions.len() as i64)
    }

    async fn create_review(&self, submission_id: i64, review_id: &str) -> StoreResult<DateTime<Utc>> {
        let mut tables = self.tables.write().await;
        if submission_id < 1 || submission_id as usize > tables.submissions.len() {
            return Err(StoreError::NotFound(format!("submission {}", submission_id)));
        }
        if tables.reviews.values().any(|r| r.submission_id == submission_id) {
            return Err(StoreError::Database(format!(
                "submission {} already has a review",
                submission_id
            )));
        }
        if tables.reviews.contains_key(review_id) {
            return Err(StoreError::Database(format!("duplicate review id {}", review_id)));
        }

        let created_at = Utc::now();
        tables.reviews.insert(
            review_id.to_string(),
            ReviewRecord {
                review_id: review_id.to_string(),
                submission_id,
                status: ReviewStatus::Running,
                total_issues: 0,
                created_at,
                completed_at: None,
            },
        );
        Ok(created_at)
    }

    async fn insert_agent_result(&self, review_id: &str, result: &AgentResult) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.reviews.contains_key(review_id) {
            return Err(StoreError::NotFound(format!("review {}", review_id)));
        }
        let results = tables.results.entry(review_id.to_string()).or_default();
        if results.iter().any(|r| r.variant == result.variant) {
            return Err(StoreError::Duplicate(format!(
                "{} result for review {}",
                result.variant, review_id
            )));
        }
        results.push(result.clone());
        Ok(())
    }

    async fn update_review_terminal(
        &self,
        review_id: &str,
        status: ReviewStatus,
        total_issues: usize,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.reviews.get_mut(review_id) {
            Some(record) if record.status == ReviewStatus::Running => {
                record.status = status;
                record.total_issues = total_issues;
                record.completed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_review(&self, review_id: &str) -> StoreResult<Option<ReviewSnapshot>> {
        let tables = self.tables.read().await;
        let Some(record) = tables.reviews.get(review_id) else {
            return Ok(None);
        };

        let submission = tables
            .submissions
            .get((record.submission_id - 1) as usize)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("submission {}", record.submission_id)))?;
        let results = tables.results.get(review_id).cloned().unwrap_or_default();

        Ok(Some(ReviewSnapshot::assemble(record.clone(), submission, results)))
    }

    async fn search_patterns(
        &self,
        query_text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> StoreResult<Vec<PatternMatch>> {
        let tables = self.tables.read().await;
        Ok(match embedding {
            Some(query) => rank_by_embedding(&tables.patterns, query, limit),
            None => lexical_matches(&tables.patterns, query_text, limit),
        })
    }

    async fn insert_pattern(&self, pattern: &ReferencePattern) -> StoreResult<i64> {
        let mut tables = self.tables.write().await;
        tables.patterns.push(pattern.clone());
        Ok(tables.patterns.len() as i64)
    }

    async fn stats(&self) -> StoreResult<Stats> {
        let tables = self.tables.read().await;

        let total_issues_found = tables
            .reviews
            .values()
            .filter(|r| r.status == ReviewStatus::Completed)
            .map(|r| r.total_issues)
            .sum();

        let times: Vec<f64> = tables
            .results
            .values()
            .flatten()
            .map(|r| r.execution_time)
            .collect();
        let avg_execution_time = if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<f64>() / times.len() as f64
        };

        Ok(Stats {
            total_reviews: tables.reviews.len(),
            total_submissions: tables.submissions.len(),
            total_issues_found,
            avg_execution_time,
            agents: AnalyzerVariant::ALL.to_vec(),
        })
    }
}
