//! Concurrent dispatch of one submission to several analyzers.

use crate::agent::Analyzer;
use crate::models::{AgentResult, AnalyzerVariant, Submission};
use crate::retrieval::Retriever;
use crate::store::Store;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Attempts at writing one result before giving up on it.
const PERSIST_ATTEMPTS: u32 = 3;

const PERSIST_BACKOFF: Duration = Duration::from_millis(50);

/// Runs every requested analyzer as its own task and persists each result
/// as soon as it is available.
pub struct TaskRunner {
    analyzers: HashMap<AnalyzerVariant, Arc<Analyzer>>,
    retriever: Option<Arc<Retriever>>,
    store: Arc<dyn Store>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Write one result, retrying failures that may be transient.
async fn persist(store: &dyn Store, review_id: &str, result: &AgentResult) {
    for attempt in 1..=PERSIST_ATTEMPTS {
        match store.insert_agent_result(review_id, result).await {
            Ok(()) => return,
            Err(e) if e.is_permanent() || attempt == PERSIST_ATTEMPTS => {
                warn!("Failed to persist {} result for {}: {}", result.variant, review_id, e);
                return;
            }
            Err(e) => {
                debug!(
                    "Persisting {} result for {} failed (attempt {}): {}",
                    result.variant, review_id, attempt, e
                );
                tokio::time::sleep(PERSIST_BACKOFF * attempt).await;
            }
        }
    }
}

impl TaskRunner {
    pub fn new(analyzers: Vec<Analyzer>, retriever: Option<Arc<Retriever>>, store: Arc<dyn Store>) -> Self {
        let analyzers = analyzers
            .into_iter()
            .map(|a| (a.variant(), Arc::new(a)))
            .collect();
        Self {
            analyzers,
            retriever,
            store,
        }
    }

    /// Variants this runner can dispatch to.
    pub fn variants(&self) -> Vec<AnalyzerVariant> {
        let mut variants: Vec<_> = self.analyzers.keys().copied().collect();
        variants.sort();
        variants
    }

    /// Provider names across every analyzer, first occurrence kept.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for variant in self.variants() {
            let Some(analyzer) = self.analyzers.get(&variant) else {
                continue;
            };
            for name in analyzer.provider_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Run the distinct `variants` concurrently and wait for all of them.
    ///
    /// Always yields exactly one result per distinct variant, in completion
    /// order. A panicking or unknown analyzer produces a failed result.
    /// Results the store refuses are still returned; the store is the
    /// source of truth for what a review shows.
    pub async fn run_all(
        &self,
        review_id: &str,
        submission: &Submission,
        variants: &[AnalyzerVariant],
        use_retrieval: bool,
    ) -> Vec<AgentResult> {
        let mut pending: Vec<AnalyzerVariant> = Vec::new();
        for variant in variants {
            if !pending.contains(variant) {
                pending.push(*variant);
            }
        }

        let submission = Arc::new(submission.clone());
        let review: Arc<str> = Arc::from(review_id);
        let mut join_set: JoinSet<AgentResult> = JoinSet::new();

        for &variant in &pending {
            let analyzer = self.analyzers.get(&variant).cloned();
            let retriever = if use_retrieval { self.retriever.clone() } else { None };
            let store = Arc::clone(&self.store);
            let submission = Arc::clone(&submission);
            let review = Arc::clone(&review);

            join_set.spawn(async move {
                let start = Instant::now();
                let run = async {
                    let Some(analyzer) = analyzer else {
                        return AgentResult::failed(
                            variant,
                            format!("No analyzer registered for {}", variant),
                            0.0,
                        );
                    };
                    let context = match retriever {
                        Some(ref retriever) => retriever.context_for(&submission.code).await,
                        None => Vec::new(),
                    };
                    analyzer
                        .analyze(&submission.code, &submission.language, &context)
                        .await
                };

                let result = match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!("{} agent panicked: {}", variant, message);
                        AgentResult::failed(
                            variant,
                            format!("Agent panicked: {}", message),
                            start.elapsed().as_secs_f64(),
                        )
                    }
                };

                persist(store.as_ref(), &review, &result).await;
                result
            });
        }

        debug!("Dispatched {} agent task(s) for {}", pending.len(), review_id);

        let mut results = Vec::with_capacity(pending.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    pending.retain(|v| *v != result.variant);
                    results.push(result);
                }
                Err(e) => warn!("Agent task for {} did not finish: {}", review_id, e),
            }
        }

        // Tasks cancelled out from under us still owe a result.
        for variant in pending {
            let result = AgentResult::failed(variant, "Agent task was cancelled".to_string(), 0.0);
            persist(self.store.as_ref(), review_id, &result).await;
            results.push(result);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::focus_for;
    use crate::config::RetrievalConfig;
    use crate::inference::testing::ScriptedBackend;
    use crate::inference::{FallbackChain, InferenceBackend};
    use crate::models::{AgentStatus, ReferencePattern};
    use crate::store::testing::FlakyStore;
    use crate::store::{MemoryStore, SqliteStore};
    use tempfile::TempDir;

    const ONE_ISSUE: &str = r#"{"issues": [{"severity": "medium", "title": "t", "description": "d", "category": "c"}]}"#;

    fn analyzer(variant: AnalyzerVariant, backend: ScriptedBackend) -> Analyzer {
        analyzer_over(variant, Arc::new(backend))
    }

    fn analyzer_over(variant: AnalyzerVariant, backend: Arc<ScriptedBackend>) -> Analyzer {
        let backends: Vec<Arc<dyn InferenceBackend>> = vec![backend];
        Analyzer::new(focus_for(variant), Arc::new(FallbackChain::new(backends)))
    }

    async fn seed_review<S: Store>(store: S, review_id: &str) -> S {
        let sid = store.insert_submission(&Submission::new("x = 1", "python")).await.unwrap();
        store.create_review(sid, review_id).await.unwrap();
        store
    }

    async fn store_with_review(review_id: &str) -> Arc<dyn Store> {
        Arc::new(seed_review(MemoryStore::new(), review_id).await)
    }

    #[tokio::test]
    async fn test_duplicate_variants_run_once() {
        let store = store_with_review("review_dup").await;
        let runner = TaskRunner::new(
            vec![analyzer(AnalyzerVariant::Security, ScriptedBackend::replying("s", ONE_ISSUE))],
            None,
            Arc::clone(&store),
        );

        let results = runner
            .run_all(
                "review_dup",
                &Submission::new("x = 1", "python"),
                &[AnalyzerVariant::Security, AnalyzerVariant::Security],
                false,
            )
            .await;

        assert_eq!(results.len(), 1);
        let snapshot = store.get_review("review_dup").await.unwrap().unwrap();
        assert_eq!(snapshot.results.len(), 1);
    }

    #[tokio::test]
    async fn test_panic_and_unknown_variant_become_failed_results() {
        let store = store_with_review("review_panic").await;
        let runner = TaskRunner::new(
            vec![
                analyzer(AnalyzerVariant::Security, ScriptedBackend::panicking("boom")),
                analyzer(AnalyzerVariant::Quality, ScriptedBackend::replying("q", ONE_ISSUE)),
            ],
            None,
            Arc::clone(&store),
        );

        let results = runner
            .run_all(
                "review_panic",
                &Submission::new("x = 1", "python"),
                &AnalyzerVariant::ALL,
                false,
            )
            .await;
        assert_eq!(results.len(), 3);

        let by_variant = |v: AnalyzerVariant| results.iter().find(|r| r.variant == v).unwrap();
        let security = by_variant(AnalyzerVariant::Security);
        assert_eq!(security.status, AgentStatus::Failed);
        assert!(security.error.as_deref().unwrap().contains("boom exploded"));

        let performance = by_variant(AnalyzerVariant::Performance);
        assert_eq!(performance.status, AgentStatus::Failed);
        assert!(performance.error.as_deref().unwrap().contains("No analyzer registered"));

        assert_eq!(by_variant(AnalyzerVariant::Quality).status, AgentStatus::Completed);

        let snapshot = store.get_review("review_panic").await.unwrap().unwrap();
        assert_eq!(snapshot.results.len(), 3);
    }

    #[tokio::test]
    async fn test_persist_failure_does_not_drop_result() {
        // No review row exists, so every insert is rejected.
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let runner = TaskRunner::new(
            vec![analyzer(AnalyzerVariant::Quality, ScriptedBackend::replying("q", ONE_ISSUE))],
            None,
            store,
        );
        let results = runner
            .run_all("review_ghost", &Submission::new("x", "python"), &[AnalyzerVariant::Quality], false)
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_completed());
    }

    #[tokio::test]
    async fn test_retrieved_patterns_reach_the_prompt() {
        let store = store_with_review("review_ctx").await;
        store
            .insert_pattern(&ReferencePattern {
                name: "bare-assignment".to_string(),
                snippet: "x = 1".to_string(),
                description: "Magic number assigned to a global".to_string(),
                category: String::new(),
                language: "python".to_string(),
                embedding: None,
            })
            .await
            .unwrap();
        let retriever = Arc::new(Retriever::new(Arc::clone(&store), None, &RetrievalConfig::default()));
        let backend = Arc::new(ScriptedBackend::replying("s", ONE_ISSUE));
        let runner = TaskRunner::new(
            vec![analyzer_over(AnalyzerVariant::Security, Arc::clone(&backend))],
            Some(retriever),
            Arc::clone(&store),
        );

        let results = runner
            .run_all("review_ctx", &Submission::new("x = 1", "python"), &[AnalyzerVariant::Security], true)
            .await;
        assert_eq!(results[0].issues.len(), 1);
        assert_eq!(runner.variants(), vec![AnalyzerVariant::Security]);

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Similar Code Patterns"));
        assert!(prompts[0].contains("1. bare-assignment"));
        assert!(prompts[0].contains("Similarity: 50.00%"));
    }

    #[tokio::test]
    async fn test_retrieval_disabled_keeps_prompt_plain() {
        let store = store_with_review("review_plain").await;
        store
            .insert_pattern(&ReferencePattern {
                name: "bare-assignment".to_string(),
                snippet: "x = 1".to_string(),
                description: String::new(),
                category: String::new(),
                language: "python".to_string(),
                embedding: None,
            })
            .await
            .unwrap();
        let retriever = Arc::new(Retriever::new(Arc::clone(&store), None, &RetrievalConfig::default()));
        let backend = Arc::new(ScriptedBackend::replying("s", ONE_ISSUE));
        let runner = TaskRunner::new(
            vec![analyzer_over(AnalyzerVariant::Security, Arc::clone(&backend))],
            Some(retriever),
            Arc::clone(&store),
        );

        runner
            .run_all("review_plain", &Submission::new("x = 1", "python"), &[AnalyzerVariant::Security], false)
            .await;
        assert!(!backend.prompts()[0].contains("Similar Code Patterns"));
    }

    #[tokio::test]
    async fn test_failed_search_runs_analyzer_without_context() {
        let store: Arc<dyn Store> =
            Arc::new(seed_review(FlakyStore::new().failing_search(), "review_nosearch").await);
        let retriever = Arc::new(Retriever::new(Arc::clone(&store), None, &RetrievalConfig::default()));
        let backend = Arc::new(ScriptedBackend::replying("q", ONE_ISSUE));
        let runner = TaskRunner::new(
            vec![analyzer_over(AnalyzerVariant::Quality, Arc::clone(&backend))],
            Some(retriever),
            Arc::clone(&store),
        );

        let results = runner
            .run_all("review_nosearch", &Submission::new("x = 1", "python"), &[AnalyzerVariant::Quality], true)
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].is_completed());
        assert_eq!(results[0].issues.len(), 1);
        assert!(!backend.prompts()[0].contains("Similar Code Patterns"));
    }

    #[tokio::test]
    async fn test_transient_persist_failure_is_retried() {
        let flaky = Arc::new(
            seed_review(
                FlakyStore::new().dropping_results_for(AnalyzerVariant::Quality, 1),
                "review_retry",
            )
            .await,
        );
        let store: Arc<dyn Store> = flaky.clone();
        let runner = TaskRunner::new(
            vec![analyzer(AnalyzerVariant::Quality, ScriptedBackend::replying("q", ONE_ISSUE))],
            None,
            Arc::clone(&store),
        );

        runner
            .run_all("review_retry", &Submission::new("x = 1", "python"), &[AnalyzerVariant::Quality], false)
            .await;

        assert_eq!(flaky.result_attempts(), 2);
        let snapshot = store.get_review("review_retry").await.unwrap().unwrap();
        assert_eq!(snapshot.results.len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_does_not_duplicate_stored_results() {
        let dir = TempDir::new().unwrap();
        let sqlite = SqliteStore::open(&dir.path().join("reviews.db")).await.unwrap();
        let store: Arc<dyn Store> = Arc::new(seed_review(sqlite, "review_rerun").await);
        let runner = TaskRunner::new(
            vec![analyzer(AnalyzerVariant::Security, ScriptedBackend::replying("s", ONE_ISSUE))],
            None,
            Arc::clone(&store),
        );
        let submission = Submission::new("x = 1", "python");

        for _ in 0..2 {
            let results = runner
                .run_all("review_rerun", &submission, &[AnalyzerVariant::Security], false)
                .await;
            assert_eq!(results.len(), 1);
        }

        let snapshot = store.get_review("review_rerun").await.unwrap().unwrap();
        assert_eq!(snapshot.results.len(), 1);
    }
}
