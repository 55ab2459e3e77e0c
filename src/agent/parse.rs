//! Parsing of raw model output into issues.
//!
//! The model is asked for one JSON object `{"issues": [...]}`, but replies
//! routinely wrap it in prose or markdown fences. We take the text between
//! the first `{` and the last `}` and parse it strictly, tolerating only
//! malformed line numbers. Anything that does not parse becomes a single
//! low-severity fallback issue; a bad reply never fails the analysis.

use crate::models::{Issue, Severity};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Characters of raw output kept in the fallback issue.
pub const FALLBACK_DESCRIPTION_CHARS: usize = 500;

pub const FALLBACK_TITLE: &str = "Analysis completed with parsing errors";

pub const FALLBACK_CATEGORY: &str = "general";

/// Outcome of parsing one model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    /// The reply contained a well-formed findings object.
    Parsed(Vec<Issue>),
    /// The reply could not be parsed; carries the synthesized issue.
    Fallback { issue: Issue, reason: String },
}

impl ParsedResponse {
    pub fn into_issues(self) -> Vec<Issue> {
        match self {
            ParsedResponse::Parsed(issues) => issues,
            ParsedResponse::Fallback { issue, .. } => vec![issue],
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedResponse::Fallback { .. })
    }
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    issues: Vec<RawFinding>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    severity: String,
    title: String,
    description: String,
    #[serde(default, deserialize_with = "lenient_line_number")]
    line_number: Option<u32>,
    category: String,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    code_snippet: Option<String>,
}

/// Models write line numbers as `12`, `"12"`, `-1` or `"n/a"`. Anything
/// that is not a positive line becomes `None` instead of failing the reply.
fn lenient_line_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let line = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    Ok(line.filter(|&n| n > 0))
}

impl From<RawFinding> for Issue {
    fn from(raw: RawFinding) -> Self {
        Issue {
            severity: Severity::from(raw.severity.as_str()),
            title: raw.title,
            description: raw.description,
            line_number: raw.line_number,
            category: raw.category,
            suggestion: raw.suggestion.filter(|s| !s.is_empty()),
            code_snippet: raw.code_snippet.filter(|s| !s.is_empty()),
        }
    }
}

/// The substring from the first `{` to the last `}`, if any.
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Parse a model reply.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let Some(object) = extract_object(raw) else {
        return fallback(raw, "no JSON object in response".to_string());
    };

    match serde_json::from_str::<RawResponse>(object) {
        Ok(parsed) => ParsedResponse::Parsed(parsed.issues.into_iter().map(Issue::from).collect()),
        Err(e) => fallback(raw, e.to_string()),
    }
}

fn fallback(raw: &str, reason: String) -> ParsedResponse {
    ParsedResponse::Fallback {
        issue: Issue {
            severity: Severity::Low,
            title: FALLBACK_TITLE.to_string(),
            description: raw.chars().take(FALLBACK_DESCRIPTION_CHARS).collect(),
            line_number: None,
            category: FALLBACK_CATEGORY.to_string(),
            suggestion: None,
            code_snippet: None,
        },
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_json() {
        let raw = r#"Here is my review:
```json
{
  "issues": [
    {
      "severity": "high",
      "title": "SQL injection",
      "description": "Query built with f-string",
      "line_number": 2,
      "category": "Injection",
      "suggestion": "Use parameters"
    },
    {
      "severity": "low",
      "title": "Naming",
      "description": "Single letter name",
      "category": "Style"
    }
  ]
}
```
Let me know if you need more."#;

        let parsed = parse_response(raw);
        assert!(!parsed.is_fallback());
        let issues = parsed.into_issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(issues[0].line_number, Some(2));
        assert_eq!(issues[0].suggestion.as_deref(), Some("Use parameters"));
        assert_eq!(issues[1].title, "Naming");
        assert_eq!(issues[1].line_number, None);
    }

    #[test]
    fn test_empty_issue_list_is_not_a_fallback() {
        let parsed = parse_response(r#"{"issues": []}"#);
        assert_eq!(parsed, ParsedResponse::Parsed(vec![]));
    }

    #[test]
    fn test_prose_only_reply_falls_back() {
        let issues = parse_response("The code looks fine to me.").into_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Low);
        assert_eq!(issues[0].category, "general");
        assert_eq!(issues[0].title, FALLBACK_TITLE);
        assert_eq!(issues[0].description, "The code looks fine to me.");
    }

    #[test]
    fn test_malformed_json_falls_back() {
        let parsed = parse_response(r#"{"issues": [{"severity": "high", "title": }]}"#);
        assert!(parsed.is_fallback());
        assert_eq!(parsed.into_issues().len(), 1);
    }

    #[test]
    fn test_missing_required_field_falls_back() {
        let parsed = parse_response(r#"{"issues": [{"severity": "high", "title": "x"}]}"#);
        assert!(parsed.is_fallback());
    }

    #[test]
    fn test_fallback_description_is_truncated_on_char_boundary() {
        let raw = "é".repeat(800);
        let issues = parse_response(&raw).into_issues();
        assert_eq!(issues[0].description.chars().count(), FALLBACK_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_odd_line_numbers_keep_the_findings() {
        let raw = r#"{"issues": [
            {"severity": "high", "title": "a", "description": "d", "category": "c", "line_number": "12"},
            {"severity": "high", "title": "b", "description": "d", "category": "c", "line_number": -1},
            {"severity": "low", "title": "c", "description": "d", "category": "c", "line_number": "n/a"},
            {"severity": "low", "title": "d", "description": "d", "category": "c", "line_number": null},
            {"severity": "low", "title": "e", "description": "d", "category": "c", "line_number": 7}
        ]}"#;

        let parsed = parse_response(raw);
        assert!(!parsed.is_fallback());
        let lines: Vec<_> = parsed.into_issues().iter().map(|i| i.line_number).collect();
        assert_eq!(lines, vec![Some(12), None, None, None, Some(7)]);
    }

    #[test]
    fn test_unknown_severity_maps_to_low() {
        let raw = r#"{"issues": [{"severity": "blocker", "title": "t", "description": "d", "category": "c"}]}"#;
        let issues = parse_response(raw).into_issues();
        assert_eq!(issues[0].severity, Severity::Low);
    }
}
