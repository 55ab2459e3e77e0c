//! The analyzer: prompt construction, inference and result assembly.

use crate::agent::focus::Focus;
use crate::agent::parse::{parse_response, ParsedResponse};
use crate::inference::FallbackChain;
use crate::models::{AgentResult, AnalyzerVariant, Issue, PatternMatch};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Reference patterns included in a prompt, at most.
pub const MAX_CONTEXT_PATTERNS: usize = 3;

/// Output format instructions appended to every prompt.
const OUTPUT_FORMAT: &str = r#"**Output Format (JSON):**
{
  "issues": [
    {
      "severity": "critical|high|medium|low",
      "title": "Brief title",
      "description": "Detailed description",
      "line_number": 10,
      "category": "Category name",
      "suggestion": "How to fix"
    }
  ]
}

Please analyze the code and return issues in the JSON format above."#;

/// One specialist reviewer: a focus plus the shared inference chain.
pub struct Analyzer {
    focus: Arc<dyn Focus>,
    chain: Arc<FallbackChain>,
}

impl Analyzer {
    pub fn new(focus: Arc<dyn Focus>, chain: Arc<FallbackChain>) -> Self {
        Self { focus, chain }
    }

    pub fn variant(&self) -> AnalyzerVariant {
        self.focus.variant()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.chain.names()
    }

    /// Build the full prompt for one submission.
    pub fn build_prompt(&self, code: &str, language: &str, context: &[PatternMatch]) -> String {
        let mut prompt = String::new();

        prompt.push_str(self.focus.prompt_header());
        prompt.push_str("\n\n**Code to Review:**\n");
        prompt.push_str(&format!("Language: {}\n", language));
        prompt.push_str(&format!("```{}\n{}\n```\n\n", language, code));

        prompt.push_str("**Focus Areas:**\n");
        for area in self.focus.focus_areas() {
            prompt.push_str(&format!("- {}\n", area));
        }

        if !context.is_empty() {
            prompt.push_str("\n**Similar Code Patterns Found (via Hybrid Search):**\n");
            for (i, pattern) in context.iter().take(MAX_CONTEXT_PATTERNS).enumerate() {
                prompt.push_str(&format!("\n{}. {}\n", i + 1, pattern.name));
                prompt.push_str(&format!(
                    "   Similarity: {:.2}%\n",
                    pattern.similarity * 100.0
                ));
                if !pattern.description.is_empty() {
                    prompt.push_str(&format!("   Context: {}\n", pattern.description));
                }
            }
        }

        prompt.push_str("\n\n");
        prompt.push_str(OUTPUT_FORMAT);
        prompt.push('\n');

        prompt
    }

    /// Analyze one submission. Never returns an error: provider failures
    /// become a failed result, unparseable replies become a fallback issue.
    pub async fn analyze(&self, code: &str, language: &str, context: &[PatternMatch]) -> AgentResult {
        let start = Instant::now();
        let variant = self.variant();
        info!("{} agent starting analysis", variant);

        let prompt = self.build_prompt(code, language, context);
        debug!(
            "{} prompt is {} bytes with {} reference pattern(s)",
            variant,
            prompt.len(),
            context.len().min(MAX_CONTEXT_PATTERNS)
        );

        let raw = match self.chain.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                let elapsed = start.elapsed().as_secs_f64();
                warn!("{} agent failed after {:.2}s: {}", variant, elapsed, e);
                return AgentResult::failed(variant, e.to_string(), elapsed);
            }
        };

        let parsed = parse_response(&raw);
        if let ParsedResponse::Fallback { ref reason, .. } = parsed {
            warn!("{} agent: failed to parse issues: {}", variant, reason);
        }
        let issues = parsed.into_issues();
        let summary = summarize(variant, &issues);
        let elapsed = start.elapsed().as_secs_f64();

        info!(
            "{} agent completed in {:.2}s - found {} issue(s)",
            variant,
            elapsed,
            issues.len()
        );

        AgentResult::completed(variant, issues, summary, elapsed)
    }
}

/// Human-readable summary, e.g. `Found 3 issue(s): 2 high, 1 low`.
///
/// Severities are listed in the order they first appear.
pub fn summarize(variant: AnalyzerVariant, issues: &[Issue]) -> String {
    if issues.is_empty() {
        return format!("No {} issues found", variant);
    }

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for issue in issues {
        let severity = issue.severity.as_str();
        match counts.iter_mut().find(|(s, _)| *s == severity) {
            Some((_, count)) => *count += 1,
            None => counts.push((severity, 1)),
        }
    }

    let breakdown: Vec<String> = counts
        .iter()
        .map(|(severity, count)| format!("{} {}", count, severity))
        .collect();

    format!("Found {} issue(s): {}", issues.len(), breakdown.join(", "))
}
