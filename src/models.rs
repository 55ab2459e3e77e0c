//! Data models for the review swarm.
//!
//! This module contains the core data structures shared by the analyzers,
//! the task runner, the store and the report generator: submissions,
//! issues, per-agent results and the pollable review snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity level of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low severity - style issues, minor suggestions
    Low,
    /// Medium severity - code quality issues, potential bugs
    Medium,
    /// High severity - bugs, security concerns
    High,
    /// Critical severity - security vulnerabilities, major bugs
    Critical,
}

impl Severity {
    /// Lowercase name as used in prompts, summaries and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Severity {
    /// Lenient mapping used for model output; anything unrecognised is `Low`.
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// A single finding reported by an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    /// Short title describing the issue.
    pub title: String,
    /// Detailed description of the issue.
    pub description: String,
    /// Line the issue refers to (1-indexed), when the model gave one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    pub category: String,
    /// Suggested fix or improvement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Optional code snippet showing the issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
}

impl Issue {
    /// Returns the line reference as a formatted string.
    pub fn line_label(&self) -> String {
        match self.line_number {
            Some(line) => line.to_string(),
            None => "n/a".to_string(),
        }
    }
}

/// The specialized reviewers a submission can be dispatched to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerVariant {
    Security,
    Performance,
    Quality,
}

impl AnalyzerVariant {
    /// All variants, in dispatch order.
    pub const ALL: [AnalyzerVariant; 3] = [
        AnalyzerVariant::Security,
        AnalyzerVariant::Performance,
        AnalyzerVariant::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerVariant::Security => "security",
            AnalyzerVariant::Performance => "performance",
            AnalyzerVariant::Quality => "quality",
        }
    }
}

impl fmt::Display for AnalyzerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalyzerVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "security" => Ok(AnalyzerVariant::Security),
            "performance" => Ok(AnalyzerVariant::Performance),
            "quality" => Ok(AnalyzerVariant::Quality),
            other => Err(format!("unknown analyzer variant: {}", other)),
        }
    }
}

/// Outcome of one analyzer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
        }
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(AgentStatus::Completed),
            "failed" => Ok(AgentStatus::Failed),
            other => Err(format!("unknown agent status: {}", other)),
        }
    }
}

/// Result from a single analyzer variant. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub variant: AnalyzerVariant,
    pub status: AgentStatus,
    pub issues: Vec<Issue>,
    pub summary: String,
    /// Wall-clock time of the analysis in seconds.
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    /// A successful analysis.
    pub fn completed(
        variant: AnalyzerVariant,
        issues: Vec<Issue>,
        summary: String,
        execution_time: f64,
    ) -> Self {
        Self {
            variant,
            status: AgentStatus::Completed,
            issues,
            summary,
            execution_time,
            error: None,
        }
    }

    /// A failed analysis. Carries no issues.
    pub fn failed(variant: AnalyzerVariant, error: String, execution_time: f64) -> Self {
        Self {
            variant,
            status: AgentStatus::Failed,
            issues: Vec::new(),
            summary: format!("Analysis failed: {}", error),
            execution_time,
            error: Some(error),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == AgentStatus::Completed
    }

    /// Issues that count toward the review total (none for failed results).
    pub fn counted_issues(&self) -> usize {
        if self.is_completed() {
            self.issues.len()
        } else {
            0
        }
    }
}

/// Code submitted for review. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
}

fn default_language() -> String {
    "python".to_string()
}

fn empty_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Submission {
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            filename: None,
            metadata: empty_metadata(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// A request to review one submission with a set of analyzers.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub submission: Submission,
    pub agents: Vec<AnalyzerVariant>,
    /// Whether analyzers receive retrieved reference patterns.
    pub use_retrieval: bool,
}

impl ReviewRequest {
    pub fn new(submission: Submission, agents: Vec<AnalyzerVariant>) -> Self {
        Self {
            submission,
            agents,
            use_retrieval: true,
        }
    }
}

/// Lifecycle of a review: `running -> completed`, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Running,
    Completed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Running => "running",
            ReviewStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ReviewStatus::Running),
            "completed" => Ok(ReviewStatus::Completed),
            other => Err(format!("unknown review status: {}", other)),
        }
    }
}

/// The review row as stored, without its joined children.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub review_id: String,
    pub submission_id: i64,
    pub status: ReviewStatus,
    pub total_issues: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Everything a client sees when polling a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSnapshot {
    pub review_id: String,
    pub status: ReviewStatus,
    pub submission: Submission,
    pub results: Vec<AgentResult>,
    pub total_issues: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds between creation and completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
}

impl ReviewSnapshot {
    /// Join a review row with its submission and the results persisted so far.
    pub fn assemble(record: ReviewRecord, submission: Submission, results: Vec<AgentResult>) -> Self {
        let total_time = record
            .completed_at
            .map(|done| (done - record.created_at).num_milliseconds() as f64 / 1000.0);

        Self {
            review_id: record.review_id,
            status: record.status,
            submission,
            results,
            total_issues: record.total_issues,
            created_at: record.created_at,
            completed_at: record.completed_at,
            total_time,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ReviewStatus::Completed
    }

    /// Iterate over issues from completed results only.
    pub fn counted_issues(&self) -> impl Iterator<Item = &Issue> {
        self.results
            .iter()
            .filter(|r| r.is_completed())
            .flat_map(|r| r.issues.iter())
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &AgentResult> {
        self.results.iter().filter(|r| !r.is_completed())
    }
}

/// A stored exemplar snippet used as retrieval input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePattern {
    pub name: String,
    pub snippet: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub snippet: String,
    pub name: String,
    pub description: String,
    pub similarity: f32,
}

/// Aggregate counters across all reviews.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_reviews: usize,
    pub total_submissions: usize,
    pub total_issues_found: usize,
    pub avg_execution_time: f64,
    pub agents: Vec<AnalyzerVariant>,
}

/// Overall service state reported by the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// The store is unreachable or no inference provider is configured.
    Degraded,
}

/// Result of the health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
    pub store_connected: bool,
    pub agents_available: Vec<AnalyzerVariant>,
    /// Provider names in fallback order.
    pub providers: Vec<String>,
    pub version: String,
}

/// Summary of issues found during analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueSummary {
    /// Total number of issues.
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Issues grouped by category.
    pub by_category: std::collections::HashMap<String, usize>,
}

impl IssueSummary {
    /// Creates a summary from a list of issues.
    pub fn from_issues<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        let mut summary = Self::default();

        for issue in issues {
            summary.total += 1;
            match issue.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }

            *summary
                .by_category
                .entry(issue.category.clone())
                .or_insert(0) += 1;
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Severity, category: &str) -> Issue {
        Issue {
            severity,
            title: "Test".to_string(),
            description: String::new(),
            line_number: None,
            category: category.to_string(),
            suggestion: None,
            code_snippet: None,
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_from_str_is_lenient() {
        assert_eq!(Severity::from("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from(" high "), Severity::High);
        assert_eq!(Severity::from("medium"), Severity::Medium);
        assert_eq!(Severity::from("blocker"), Severity::Low);
    }

    #[test]
    fn test_variant_round_trips_through_str() {
        for variant in AnalyzerVariant::ALL {
            assert_eq!(variant.as_str().parse::<AnalyzerVariant>(), Ok(variant));
        }
        assert!("style".parse::<AnalyzerVariant>().is_err());
    }

    #[test]
    fn test_failed_result_counts_nothing() {
        let failed = AgentResult::failed(AnalyzerVariant::Security, "boom".to_string(), 0.2);
        assert_eq!(failed.status, AgentStatus::Failed);
        assert!(failed.issues.is_empty());
        assert_eq!(failed.counted_issues(), 0);
        assert_eq!(failed.summary, "Analysis failed: boom");

        let ok = AgentResult::completed(
            AnalyzerVariant::Quality,
            vec![issue(Severity::Low, "general")],
            "Found 1 issue(s): 1 low".to_string(),
            0.1,
        );
        assert_eq!(ok.counted_issues(), 1);
    }

    #[test]
    fn test_snapshot_total_time_only_when_completed() {
        let created = Utc::now();
        let record = ReviewRecord {
            review_id: "review_abc".to_string(),
            submission_id: 1,
            status: ReviewStatus::Running,
            total_issues: 0,
            created_at: created,
            completed_at: None,
        };
        let running = ReviewSnapshot::assemble(record.clone(), Submission::new("x", "python"), vec![]);
        assert_eq!(running.total_time, None);

        let done = ReviewRecord {
            status: ReviewStatus::Completed,
            completed_at: Some(created + chrono::Duration::milliseconds(1500)),
            ..record
        };
        let completed = ReviewSnapshot::assemble(done, Submission::new("x", "python"), vec![]);
        assert_eq!(completed.total_time, Some(1.5));
    }

    #[test]
    fn test_submission_defaults_when_deserialized() {
        let submission: Submission = serde_json::from_str(r#"{"code": "print(1)"}"#).unwrap();
        assert_eq!(submission.language, "python");
        assert!(submission.metadata.as_object().is_some_and(|m| m.is_empty()));
    }

    #[test]
    fn test_issue_summary() {
        let issues = vec![
            issue(Severity::Critical, "Security"),
            issue(Severity::High, "Bug"),
            issue(Severity::Low, "Security"),
        ];

        let summary = IssueSummary::from_issues(&issues);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.low, 1);
        assert_eq!(summary.by_category.get("Security"), Some(&2));
        assert_eq!(summary.by_category.get("Bug"), Some(&1));
    }
}
