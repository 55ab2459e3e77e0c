//! Review entry points: submit, poll, stats.

use crate::agent::{focus_for, Analyzer};
use crate::config::Config;
use crate::error::ReviewError;
use crate::inference::{Embedder, FallbackChain, OllamaEmbedder};
use crate::models::{
    AnalyzerVariant, Health, HealthStatus, ReviewRecord, ReviewRequest, ReviewSnapshot,
    ReviewStatus, Stats,
};
use crate::retrieval::Retriever;
use crate::review::aggregator::Aggregator;
use crate::review::runner::TaskRunner;
use crate::store::Store;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A freshly accepted review.
pub struct SubmittedReview {
    /// The review as it looked when accepted: running, no results.
    pub snapshot: ReviewSnapshot,
    /// The background job. Dropping it does not cancel the review.
    pub handle: JoinHandle<()>,
}

/// Owns the store handle and the analyzer roster, and runs reviews in the
/// background.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    runner: Arc<TaskRunner>,
    aggregator: Arc<Aggregator>,
}

/// `review_` followed by 12 hex characters.
fn new_review_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("review_{}", &hex[..12])
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, analyzers: Vec<Analyzer>, retriever: Option<Arc<Retriever>>) -> Self {
        let runner = Arc::new(TaskRunner::new(analyzers, retriever, Arc::clone(&store)));
        let aggregator = Arc::new(Aggregator::new(Arc::clone(&store)));
        Self {
            store,
            runner,
            aggregator,
        }
    }

    /// Build every analyzer variant over one shared provider chain.
    pub fn from_config(config: &Config, store: Arc<dyn Store>) -> Self {
        let chain = Arc::new(FallbackChain::from_config(&config.providers));
        if chain.is_empty() {
            warn!("No inference provider is available; every analysis will fail");
        } else {
            info!("Inference providers: {}", chain.names().join(" -> "));
        }

        let analyzers = AnalyzerVariant::ALL
            .iter()
            .map(|&variant| Analyzer::new(focus_for(variant), Arc::clone(&chain)))
            .collect();

        let retriever = if config.retrieval.enabled {
            let embedder = config.retrieval.embedding_model.as_deref().map(|model| {
                Arc::new(OllamaEmbedder::new(&config.retrieval.embedding_url, model)) as Arc<dyn Embedder>
            });
            Some(Arc::new(Retriever::new(
                Arc::clone(&store),
                embedder,
                &config.retrieval,
            )))
        } else {
            None
        };

        Self::new(store, analyzers, retriever)
    }

    /// Accept a review and start it in the background.
    ///
    /// Returns as soon as the submission and the running review are
    /// persisted; poll [`Orchestrator::get_review`] for progress.
    pub async fn submit(&self, request: ReviewRequest) -> Result<SubmittedReview, ReviewError> {
        if request.submission.code.trim().is_empty() {
            return Err(ReviewError::InvalidRequest("code must not be empty".to_string()));
        }
        if request.agents.is_empty() {
            return Err(ReviewError::InvalidRequest(
                "at least one agent must be requested".to_string(),
            ));
        }

        let submission_id = self.store.insert_submission(&request.submission).await?;
        let review_id = new_review_id();
        let created_at = self.store.create_review(submission_id, &review_id).await?;

        info!(
            "Review {} started with agents: {}",
            review_id,
            request
                .agents
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let snapshot = ReviewSnapshot::assemble(
            ReviewRecord {
                review_id: review_id.clone(),
                submission_id,
                status: ReviewStatus::Running,
                total_issues: 0,
                created_at,
                completed_at: None,
            },
            request.submission.clone(),
            Vec::new(),
        );

        let runner = Arc::clone(&self.runner);
        let aggregator = Arc::clone(&self.aggregator);
        let ReviewRequest {
            submission,
            agents,
            use_retrieval,
        } = request;

        let handle = tokio::spawn(async move {
            let results = runner
                .run_all(&review_id, &submission, &agents, use_retrieval)
                .await;
            debug!("Review {} gathered {} result(s)", review_id, results.len());
            if let Err(e) = aggregator.finalize(&review_id, &agents).await {
                error!("Failed to finalize review {}: {}", review_id, e);
            }
        });

        Ok(SubmittedReview { snapshot, handle })
    }

    /// Current state of a review.
    pub async fn get_review(&self, review_id: &str) -> Result<ReviewSnapshot, ReviewError> {
        self.store
            .get_review(review_id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(review_id.to_string()))
    }

    pub async fn get_stats(&self) -> Result<Stats, ReviewError> {
        let mut stats = self.store.stats().await?;
        stats.agents = self.runner.variants();
        Ok(stats)
    }

    /// Round-trip the store and report what this instance can run.
    pub async fn health(&self) -> Health {
        let store_connected = match self.store.stats().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Store health check failed: {}", e);
                false
            }
        };
        let providers = self.runner.providers();
        let status = if store_connected && !providers.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        Health {
            status,
            store_connected,
            agents_available: self.runner.variants(),
            providers,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::ScriptedBackend;
    use crate::inference::InferenceBackend;
    use crate::models::{AgentStatus, Submission};
    use crate::review::aggregator::total_issues;
    use crate::store::testing::FlakyStore;
    use crate::store::MemoryStore;
    use tokio::sync::Semaphore;

    const TWO_ISSUES: &str = r#"Sure! {"issues": [
        {"severity": "high", "title": "SQL injection", "description": "f-string query", "line_number": 3, "category": "Injection"},
        {"severity": "low", "title": "Naming", "description": "x is vague", "category": "Style"}
    ]}"#;

    const ONE_ISSUE: &str = r#"{"issues": [{"severity": "medium", "title": "Loop", "description": "n^2", "category": "Complexity"}]}"#;

    fn analyzer(variant: AnalyzerVariant, backend: ScriptedBackend) -> Analyzer {
        let backends: Vec<Arc<dyn InferenceBackend>> = vec![Arc::new(backend)];
        Analyzer::new(focus_for(variant), Arc::new(FallbackChain::new(backends)))
    }

    fn request(agents: Vec<AnalyzerVariant>) -> ReviewRequest {
        ReviewRequest::new(
            Submission::new("def login(u):\n    q = f\"SELECT * FROM users WHERE name='{u}'\"\n", "python"),
            agents,
        )
    }

    #[test]
    fn test_review_id_shape() {
        let id = new_review_id();
        assert!(id.starts_with("review_"));
        assert_eq!(id.len(), "review_".len() + 12);
        assert!(id["review_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_review_id());
    }

    #[tokio::test]
    async fn test_single_agent_poll_before_and_after_completion() {
        let gate = Arc::new(Semaphore::new(0));
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            vec![analyzer(
                AnalyzerVariant::Security,
                ScriptedBackend::replying("stub", TWO_ISSUES).gated(Arc::clone(&gate)),
            )],
            None,
        );

        let submitted = orchestrator
            .submit(request(vec![AnalyzerVariant::Security]))
            .await
            .unwrap();
        let review_id = submitted.snapshot.review_id.clone();
        assert_eq!(submitted.snapshot.status, ReviewStatus::Running);
        assert!(submitted.snapshot.results.is_empty());

        let polled = orchestrator.get_review(&review_id).await.unwrap();
        assert_eq!(polled.status, ReviewStatus::Running);
        assert!(polled.results.is_empty());
        assert!(polled.completed_at.is_none());

        gate.add_permits(1);
        submitted.handle.await.unwrap();

        let done = orchestrator.get_review(&review_id).await.unwrap();
        assert_eq!(done.status, ReviewStatus::Completed);
        assert_eq!(done.results.len(), 1);
        assert_eq!(done.results[0].issues.len(), 2);
        assert_eq!(done.total_issues, 2);
        assert!(done.total_time.is_some());
    }

    #[tokio::test]
    async fn test_failing_backend_only_fails_its_variant() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            vec![
                analyzer(AnalyzerVariant::Security, ScriptedBackend::failing("down")),
                analyzer(AnalyzerVariant::Performance, ScriptedBackend::replying("p", ONE_ISSUE)),
                analyzer(AnalyzerVariant::Quality, ScriptedBackend::replying("q", TWO_ISSUES)),
            ],
            None,
        );

        let submitted = orchestrator
            .submit(request(AnalyzerVariant::ALL.to_vec()))
            .await
            .unwrap();
        let review_id = submitted.snapshot.review_id.clone();
        submitted.handle.await.unwrap();

        let done = orchestrator.get_review(&review_id).await.unwrap();
        assert_eq!(done.results.len(), 3);

        let failed: Vec<_> = done.failed_results().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].variant, AnalyzerVariant::Security);
        assert!(failed[0].issues.is_empty());
        assert!(!failed[0].error.as_deref().unwrap_or_default().is_empty());

        let completed = done
            .results
            .iter()
            .filter(|r| r.status == AgentStatus::Completed)
            .count();
        assert_eq!(completed, 2);
        assert_eq!(done.total_issues, 3);
        assert_eq!(done.counted_issues().count(), 3);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let orchestrator = Orchestrator::new(Arc::new(MemoryStore::new()), vec![], None);

        let empty_code = ReviewRequest::new(Submission::new("  \n", "python"), vec![AnalyzerVariant::Quality]);
        assert!(matches!(
            orchestrator.submit(empty_code).await,
            Err(ReviewError::InvalidRequest(_))
        ));
        assert!(matches!(
            orchestrator.submit(request(vec![])).await,
            Err(ReviewError::InvalidRequest(_))
        ));

        let stats = orchestrator.get_stats().await.unwrap();
        assert_eq!(stats.total_submissions, 0);
    }

    #[tokio::test]
    async fn test_unknown_review_is_not_found() {
        let orchestrator = Orchestrator::new(Arc::new(MemoryStore::new()), vec![], None);
        match orchestrator.get_review("review_000000000000").await {
            Err(ReviewError::NotFound(id)) => assert_eq!(id, "review_000000000000"),
            other => panic!("expected NotFound, got {:?}", other.map(|s| s.review_id)),
        }
    }

    #[tokio::test]
    async fn test_stats_after_reviews() {
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryStore::new()),
            vec![
                analyzer(AnalyzerVariant::Performance, ScriptedBackend::replying("p", ONE_ISSUE)),
                analyzer(AnalyzerVariant::Quality, ScriptedBackend::replying("q", TWO_ISSUES)),
            ],
            None,
        );

        for _ in 0..2 {
            let submitted = orchestrator
                .submit(request(vec![AnalyzerVariant::Performance, AnalyzerVariant::Quality]))
                .await
                .unwrap();
            submitted.handle.await.unwrap();
        }

        let stats = orchestrator.get_stats().await.unwrap();
        assert_eq!(stats.total_reviews, 2);
        assert_eq!(stats.total_submissions, 2);
        assert_eq!(stats.total_issues_found, 6);
        assert_eq!(
            stats.agents,
            vec![AnalyzerVariant::Performance, AnalyzerVariant::Quality]
        );
    }

    #[tokio::test]
    async fn test_unstored_result_holds_review_running() {
        let store: Arc<dyn Store> =
            Arc::new(FlakyStore::new().rejecting_results_for(AnalyzerVariant::Quality));
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            vec![
                analyzer(AnalyzerVariant::Security, ScriptedBackend::replying("s", ONE_ISSUE)),
                analyzer(AnalyzerVariant::Quality, ScriptedBackend::replying("q", ONE_ISSUE)),
            ],
            None,
        );

        let submitted = orchestrator
            .submit(request(vec![AnalyzerVariant::Security, AnalyzerVariant::Quality]))
            .await
            .unwrap();
        let review_id = submitted.snapshot.review_id.clone();
        submitted.handle.await.unwrap();

        let polled = orchestrator.get_review(&review_id).await.unwrap();
        assert_eq!(polled.status, ReviewStatus::Running);
        assert_eq!(polled.results.len(), 1);
        assert_eq!(polled.results[0].variant, AnalyzerVariant::Security);
        assert_eq!(polled.total_issues, 0);
        assert!(polled.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_completed_total_matches_stored_results() {
        let store: Arc<dyn Store> =
            Arc::new(FlakyStore::new().dropping_results_for(AnalyzerVariant::Quality, 1));
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            vec![
                analyzer(AnalyzerVariant::Security, ScriptedBackend::replying("s", ONE_ISSUE)),
                analyzer(AnalyzerVariant::Quality, ScriptedBackend::replying("q", TWO_ISSUES)),
            ],
            None,
        );

        let submitted = orchestrator
            .submit(request(vec![AnalyzerVariant::Security, AnalyzerVariant::Quality]))
            .await
            .unwrap();
        let review_id = submitted.snapshot.review_id.clone();
        submitted.handle.await.unwrap();

        let done = orchestrator.get_review(&review_id).await.unwrap();
        assert!(done.is_completed());
        assert_eq!(done.results.len(), 2);
        assert_eq!(done.total_issues, 3);
        assert_eq!(done.total_issues, total_issues(&done.results));
    }

    #[tokio::test]
    async fn test_health_reports_agents_and_providers() {
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryStore::new()),
            vec![
                analyzer(AnalyzerVariant::Quality, ScriptedBackend::replying("stub", ONE_ISSUE)),
                analyzer(AnalyzerVariant::Security, ScriptedBackend::replying("stub", ONE_ISSUE)),
            ],
            None,
        );

        let health = orchestrator.health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.store_connected);
        assert_eq!(
            health.agents_available,
            vec![AnalyzerVariant::Security, AnalyzerVariant::Quality]
        );
        assert_eq!(health.providers, vec!["stub".to_string()]);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_health_without_providers_is_degraded() {
        let orchestrator = Orchestrator::new(Arc::new(MemoryStore::new()), vec![], None);
        let health = orchestrator.health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.store_connected);
        assert!(health.providers.is_empty());
    }
}
