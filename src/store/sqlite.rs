//! SQLite store on a dedicated connection thread (`tokio-rusqlite`).
//!
//! Writes run inside `BEGIN IMMEDIATE` transactions. JSON encoding and
//! timestamp parsing stay outside the connection closures so the closures
//! only ever fail with `rusqlite::Error`.

use super::{schema, Store, StoreResult};
use crate::error::StoreError;
use crate::models::{
    AgentResult, AgentStatus, AnalyzerVariant, Issue, PatternMatch, ReferencePattern,
    ReviewRecord, ReviewSnapshot, ReviewStatus, Stats, Submission,
};
use crate::retrieval::ranking::{rank_by_embedding, LEXICAL_SIMILARITY};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tokio_rusqlite::Connection;
use tracing::debug;

/// A [`Store`] persisted to a single SQLite file in WAL mode.
pub struct SqliteStore {
    conn: Connection,
}

struct ReviewRow {
    review_id: String,
    submission_id: i64,
    status: String,
    total_issues: i64,
    created_at: String,
    completed_at: Option<String>,
    code: String,
    language: String,
    filename: Option<String>,
    metadata: String,
}

struct ResultRow {
    agent_name: String,
    status: String,
    issues: String,
    summary: String,
    execution_time: f64,
    error: Option<String>,
}

enum ResultInsert {
    Inserted,
    MissingReview,
    Duplicate,
}

struct PatternRow {
    name: String,
    snippet: String,
    description: String,
    category: String,
    language: String,
    embedding: Option<String>,
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", raw, e)))
}

impl ReviewRow {
    fn into_parts(self) -> StoreResult<(ReviewRecord, Submission)> {
        let record = ReviewRecord {
            status: self
                .status
                .parse::<ReviewStatus>()
                .map_err(StoreError::Serialization)?,
            total_issues: self.total_issues.max(0) as usize,
            created_at: parse_timestamp(&self.created_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
            review_id: self.review_id,
            submission_id: self.submission_id,
        };
        let submission = Submission {
            code: self.code,
            language: self.language,
            filename: self.filename,
            metadata: serde_json::from_str(&self.metadata)?,
        };
        Ok((record, submission))
    }
}

impl ResultRow {
    fn into_result(self) -> StoreResult<AgentResult> {
        let issues: Vec<Issue> = serde_json::from_str(&self.issues)?;
        Ok(AgentResult {
            variant: self
                .agent_name
                .parse::<AnalyzerVariant>()
                .map_err(StoreError::Serialization)?,
            status: self
                .status
                .parse::<AgentStatus>()
                .map_err(StoreError::Serialization)?,
            issues,
            summary: self.summary,
            execution_time: self.execution_time,
            error: self.error,
        })
    }
}

impl PatternRow {
    fn into_pattern(self) -> StoreResult<ReferencePattern> {
        let embedding = match self.embedding {
            Some(ref raw) => Some(serde_json::from_str::<Vec<f32>>(raw)?),
            None => None,
        };
        Ok(ReferencePattern {
            name: self.name,
            snippet: self.snippet,
            description: self.description,
            category: self.category,
            language: self.language,
            embedding,
        })
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`, configure WAL and migrate.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).await?;

        conn.call(|db| {
            db.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA foreign_keys=ON;",
            )?;
            db.busy_timeout(Duration::from_secs(5))?;
            schema::migrate(db)?;
            Ok::<_, rusqlite::Error>(())
        })
        .await?;

        debug!("SQLite store ready at {}", path.display());
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<i64> {
        let code = submission.code.clone();
        let language = submission.language.clone();
        let filename = submission.filename.clone();
        let metadata = serde_json::to_string(&submission.metadata)?;
        let now = Utc::now().to_rfc3339();

        let id = self
            .conn
            .call(move |db| {
                let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "INSERT INTO submissions (code, language, filename, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![code, language, filename, metadata, now],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok::<_, rusqlite::Error>(id)
            })
            .await?;
        Ok(id)
    }

    async fn create_review(&self, submission_id: i64, review_id: &str) -> StoreResult<DateTime<Utc>> {
        let review_id = review_id.to_owned();
        let created_at = Utc::now();
        let stamp = created_at.to_rfc3339();

        let inserted = self
            .conn
            .call(move |db| -> rusqlite::Result<bool> {
                let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM submissions WHERE id = ?1",
                        params![submission_id],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if !exists {
                    return Ok(false);
                }
                tx.execute(
                    "INSERT INTO reviews (review_id, submission_id, status, total_issues, created_at)
                     VALUES (?1, ?2, 'running', 0, ?3)",
                    params![review_id, submission_id, stamp],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await?;

        if !inserted {
            return Err(StoreError::NotFound(format!("submission {}", submission_id)));
        }
        Ok(created_at)
    }

    async fn insert_agent_result(&self, review_id: &str, result: &AgentResult) -> StoreResult<()> {
        let review = review_id.to_owned();
        let agent_name = result.variant.as_str();
        let status = result.status.as_str();
        let issues = serde_json::to_string(&result.issues)?;
        let summary = result.summary.clone();
        let execution_time = result.execution_time;
        let error = result.error.clone();
        let now = Utc::now().to_rfc3339();

        let outcome = self
            .conn
            .call(move |db| -> rusqlite::Result<ResultInsert> {
                let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM reviews WHERE review_id = ?1",
                        params![review],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if !exists {
                    return Ok(ResultInsert::MissingReview);
                }
                let duplicate = tx
                    .query_row(
                        "SELECT 1 FROM agent_results WHERE review_id = ?1 AND agent_name = ?2",
                        params![review, agent_name],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if duplicate {
                    return Ok(ResultInsert::Duplicate);
                }
                tx.execute(
                    "INSERT INTO agent_results
                         (review_id, agent_name, status, issues, summary, execution_time, error, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![review, agent_name, status, issues, summary, execution_time, error, now],
                )?;
                tx.commit()?;
                Ok(ResultInsert::Inserted)
            })
            .await?;

        match outcome {
            ResultInsert::Inserted => Ok(()),
            ResultInsert::MissingReview => Err(StoreError::NotFound(format!("review {}", review_id))),
            ResultInsert::Duplicate => Err(StoreError::Duplicate(format!(
                "{} result for review {}",
                result.variant, review_id
            ))),
        }
    }

    async fn update_review_terminal(
        &self,
        review_id: &str,
        status: ReviewStatus,
        total_issues: usize,
    ) -> StoreResult<bool> {
        let review_id = review_id.to_owned();
        let status = status.as_str();
        let total = total_issues as i64;
        let now = Utc::now().to_rfc3339();

        let changed = self
            .conn
            .call(move |db| {
                let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let changed = tx.execute(
                    "UPDATE reviews SET status = ?1, total_issues = ?2, completed_at = ?3
                     WHERE review_id = ?4 AND status = 'running'",
                    params![status, total, now, review_id],
                )?;
                tx.commit()?;
                Ok::<_, rusqlite::Error>(changed)
            })
            .await?;
        Ok(changed > 0)
    }

    async fn get_review(&self, review_id: &str) -> StoreResult<Option<ReviewSnapshot>> {
        let review_id = review_id.to_owned();

        let rows = self
            .conn
            .call(move |db| -> rusqlite::Result<Option<(ReviewRow, Vec<ResultRow>)>> {
                let review = db
                    .query_row(
                        "SELECT r.review_id, r.submission_id, r.status, r.total_issues,
                                r.created_at, r.completed_at,
                                s.code, s.language, s.filename, s.metadata
                         FROM reviews r
                         JOIN submissions s ON s.id = r.submission_id
                         WHERE r.review_id = ?1",
                        params![review_id],
                        |r| {
                            Ok(ReviewRow {
                                review_id: r.get(0)?,
                                submission_id: r.get(1)?,
                                status: r.get(2)?,
                                total_issues: r.get(3)?,
                                created_at: r.get(4)?,
                                completed_at: r.get(5)?,
                                code: r.get(6)?,
                                language: r.get(7)?,
                                filename: r.get(8)?,
                                metadata: r.get(9)?,
                            })
                        },
                    )
                    .optional()?;

                let Some(review) = review else {
                    return Ok(None);
                };

                let mut stmt = db.prepare(
                    "SELECT agent_name, status, issues, summary, execution_time, error
                     FROM agent_results WHERE review_id = ?1 ORDER BY id",
                )?;
                let results = stmt
                    .query_map(params![review_id], |r| {
                        Ok(ResultRow {
                            agent_name: r.get(0)?,
                            status: r.get(1)?,
                            issues: r.get(2)?,
                            summary: r.get(3)?,
                            execution_time: r.get(4)?,
                            error: r.get(5)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                Ok(Some((review, results)))
            })
            .await?;

        let Some((review, results)) = rows else {
            return Ok(None);
        };
        let (record, submission) = review.into_parts()?;
        let results = results
            .into_iter()
            .map(ResultRow::into_result)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some(ReviewSnapshot::assemble(record, submission, results)))
    }

    async fn search_patterns(
        &self,
        query_text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> StoreResult<Vec<PatternMatch>> {
        if let Some(query) = embedding {
            // No vector index in SQLite; rank the embedded rows here.
            let rows = self
                .conn
                .call(|db| {
                    let mut stmt = db.prepare(
                        "SELECT name, snippet, description, category, language, embedding
                         FROM reference_patterns WHERE embedding IS NOT NULL ORDER BY id",
                    )?;
                    let rows = stmt
                        .query_map([], |r| {
                            Ok(PatternRow {
                                name: r.get(0)?,
                                snippet: r.get(1)?,
                                description: r.get(2)?,
                                category: r.get(3)?,
                                language: r.get(4)?,
                                embedding: r.get(5)?,
                            })
                        })?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    Ok::<_, rusqlite::Error>(rows)
                })
                .await?;

            let patterns = rows
                .into_iter()
                .map(PatternRow::into_pattern)
                .collect::<StoreResult<Vec<_>>>()?;
            return Ok(rank_by_embedding(&patterns, query, limit));
        }

        let needle = query_text.to_owned();
        let limit = limit as i64;
        let matches = self
            .conn
            .call(move |db| {
                let mut stmt = db.prepare(
                    "SELECT name, snippet, description FROM reference_patterns
                     WHERE instr(lower(snippet), lower(?1)) > 0
                     ORDER BY id LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![needle, limit], |r| {
                        Ok(PatternMatch {
                            name: r.get(0)?,
                            snippet: r.get(1)?,
                            description: r.get(2)?,
                            similarity: LEXICAL_SIMILARITY,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok::<_, rusqlite::Error>(rows)
            })
            .await?;
        Ok(matches)
    }

    async fn insert_pattern(&self, pattern: &ReferencePattern) -> StoreResult<i64> {
        let embedding = pattern
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let pattern = pattern.clone();

        let id = self
            .conn
            .call(move |db| {
                let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "INSERT INTO reference_patterns
                         (name, snippet, description, category, language, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        pattern.name,
                        pattern.snippet,
                        pattern.description,
                        pattern.category,
                        pattern.language,
                        embedding
                    ],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok::<_, rusqlite::Error>(id)
            })
            .await?;
        Ok(id)
    }

    async fn stats(&self) -> StoreResult<Stats> {
        let (reviews, submissions, issues, avg) = self
            .conn
            .call(|db| {
                let row = db.query_row(
                    "SELECT
                         (SELECT COUNT(*) FROM reviews),
                         (SELECT COUNT(*) FROM submissions),
                         (SELECT COALESCE(SUM(total_issues), 0) FROM reviews
                          WHERE status = 'completed'),
                         (SELECT COALESCE(AVG(execution_time), 0.0) FROM agent_results)",
                    [],
                    |r| {
                        Ok((
                            r.get::<_, i64>(0)?,
                            r.get::<_, i64>(1)?,
                            r.get::<_, i64>(2)?,
                            r.get::<_, f64>(3)?,
                        ))
                    },
                )?;
                Ok::<_, rusqlite::Error>(row)
            })
            .await?;

        Ok(Stats {
            total_reviews: reviews as usize,
            total_submissions: submissions as usize,
            total_issues_found: issues as usize,
            avg_execution_time: avg,
            agents: AnalyzerVariant::ALL.to_vec(),
        })
    }
}
