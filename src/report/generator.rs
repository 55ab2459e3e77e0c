//! Markdown and JSON report generation.
//!
//! Reports are rendered from a [`ReviewSnapshot`], so a running review can
//! be shown too; it simply has fewer agent sections.

use crate::models::{AgentResult, Issue, IssueSummary, ReviewSnapshot, Severity};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(snapshot: &ReviewSnapshot) -> String {
    let mut output = String::new();

    output.push_str("# Code Review Report\n\n");
    output.push_str(&generate_metadata_section(snapshot));

    let summary = IssueSummary::from_issues(snapshot.counted_issues());
    output.push_str(&generate_summary_section(&summary));
    output.push_str(&generate_agents_section(&snapshot.results));
    output.push_str(&generate_issues_section(&snapshot.results));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(snapshot: &ReviewSnapshot) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Review ID:** `{}`\n", snapshot.review_id));
    section.push_str(&format!("- **Status:** {}\n", snapshot.status));
    if let Some(ref filename) = snapshot.submission.filename {
        section.push_str(&format!("- **File:** `{}`\n", filename));
    }
    section.push_str(&format!("- **Language:** {}\n", snapshot.submission.language));
    section.push_str(&format!(
        "- **Lines of Code:** {}\n",
        snapshot.submission.code.lines().count()
    ));
    section.push_str(&format!(
        "- **Submitted:** {}\n",
        snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(completed) = snapshot.completed_at {
        section.push_str(&format!(
            "- **Completed:** {}\n",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    if let Some(total_time) = snapshot.total_time {
        section.push_str(&format!("- **Review Duration:** {:.1}s\n", total_time));
    }
    section.push_str(&format!("- **Total Issues:** {}\n", snapshot.total_issues));
    section.push('\n');

    section
}

/// Generate the summary section.
fn generate_summary_section(summary: &IssueSummary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    section.push_str("### Issue Severity Breakdown\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | **Total** |\n",
        Severity::Critical.emoji(),
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        summary.critical, summary.high, summary.medium, summary.low, summary.total
    ));

    if !summary.by_category.is_empty() {
        section.push_str("### Issues by Category\n\n");
        section.push_str("| Category | Count |\n");
        section.push_str("|:---|:---:|\n");

        let mut categories: Vec<_> = summary.by_category.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (category, count) in categories {
            section.push_str(&format!("| {} | {} |\n", category, count));
        }
        section.push('\n');
    }

    section
}

/// Generate the per-agent overview table.
fn generate_agents_section(results: &[AgentResult]) -> String {
    let mut section = String::new();

    section.push_str("## Agents\n\n");

    if results.is_empty() {
        section.push_str("No agent has reported yet.\n\n");
        return section;
    }

    section.push_str("| Agent | Status | Issues | Time |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");
    for result in results {
        section.push_str(&format!(
            "| {} | {} | {} | {:.2}s |\n",
            result.variant,
            result.status.as_str(),
            result.issues.len(),
            result.execution_time
        ));
    }
    section.push('\n');

    section
}

/// Generate the issues section, one subsection per agent.
fn generate_issues_section(results: &[AgentResult]) -> String {
    let mut section = String::new();

    section.push_str("## Issues by Agent\n\n");

    if results.iter().all(|r| r.issues.is_empty()) {
        section.push_str("No issues were found. Great job! 🎉\n\n");
        for result in results.iter().filter(|r| !r.is_completed()) {
            section.push_str(&generate_agent_section(result));
        }
        return section;
    }

    for result in results {
        section.push_str(&generate_agent_section(result));
    }

    section
}

/// Generate the section for a single agent.
fn generate_agent_section(result: &AgentResult) -> String {
    let mut section = String::new();

    section.push_str(&format!("### {} {{#{}}}\n\n", result.variant, result.variant));
    section.push_str(&format!("*{}*\n\n", result.summary));

    if let Some(ref error) = result.error {
        section.push_str(&format!("> ⚠️ **Error:** {}\n\n", error));
    }

    // Severity first, then line
    let mut issues = result.issues.clone();
    issues.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.line_number.cmp(&b.line_number))
    });

    for issue in &issues {
        section.push_str(&generate_issue_block(issue));
    }

    section
}

/// Generate a single issue block.
fn generate_issue_block(issue: &Issue) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "#### {} **{}** {} - {}\n\n",
        issue.severity.emoji(),
        issue.severity.as_str().to_uppercase(),
        issue.category,
        issue.title
    ));

    block.push_str(&format!("**Line:** {}\n\n", issue.line_label()));

    if !issue.description.is_empty() {
        block.push_str(&format!("**Description:** {}\n\n", issue.description));
    }

    if let Some(ref snippet) = issue.code_snippet {
        block.push_str("<details>\n<summary>View Code</summary>\n\n```\n");
        block.push_str(snippet);
        block.push_str("\n```\n</details>\n\n");
    }

    if let Some(ref suggestion) = issue.suggestion {
        block.push_str(&format!("> 💡 **Suggestion:** {}\n\n", suggestion));
    }

    block.push_str("---\n\n");

    block
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by ReviewSwarm v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(snapshot: &ReviewSnapshot) -> Result<String> {
    serde_json::to_string_pretty(snapshot).map_err(Into::into)
}
