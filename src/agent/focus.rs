//! Review focus definitions for the analyzer variants.
//!
//! A variant differs from its siblings only in what it asks the model to
//! look at; execution is shared in [`crate::agent::Analyzer`].

use crate::models::AnalyzerVariant;
use std::sync::Arc;

/// The role and focus areas that make an analyzer a specialist.
pub trait Focus: Send + Sync {
    fn variant(&self) -> AnalyzerVariant;

    /// Role description placed at the top of every prompt.
    fn prompt_header(&self) -> &'static str;

    fn focus_areas(&self) -> &'static [&'static str];
}

/// Looks for exploitable vulnerabilities.
pub struct SecurityFocus;

impl Focus for SecurityFocus {
    fn variant(&self) -> AnalyzerVariant {
        AnalyzerVariant::Security
    }

    fn prompt_header(&self) -> &'static str {
        r#"You are a security expert reviewing code for vulnerabilities.
Your mission is to identify security issues like:
- SQL injection vulnerabilities
- XSS (Cross-Site Scripting) risks
- Authentication/authorization flaws
- Insecure data handling
- Hardcoded secrets or credentials
- Unsafe deserialization
- Path traversal vulnerabilities
- CSRF vulnerabilities
- Insecure cryptography usage
- Information disclosure

Be thorough but practical. Focus on real security risks, not theoretical ones.
Provide clear explanations and actionable fixes."#
    }

    fn focus_areas(&self) -> &'static [&'static str] {
        &[
            "SQL Injection and NoSQL Injection",
            "Cross-Site Scripting (XSS)",
            "Authentication & Authorization",
            "Sensitive Data Exposure",
            "Security Misconfiguration",
            "Insecure Dependencies",
            "Injection Flaws",
            "Broken Access Control",
            "Cryptographic Issues",
            "Input Validation",
        ]
    }
}

/// Looks for measurable performance problems.
pub struct PerformanceFocus;

impl Focus for PerformanceFocus {
    fn variant(&self) -> AnalyzerVariant {
        AnalyzerVariant::Performance
    }

    fn prompt_header(&self) -> &'static str {
        r#"You are a performance optimization expert reviewing code.
Your mission is to identify performance issues like:
- Inefficient algorithms (O(n^2) where O(n) is possible)
- N+1 query problems
- Missing database indexes
- Memory leaks
- Unnecessary loops or iterations
- Inefficient data structures
- Missing caching opportunities
- Blocking I/O operations
- Resource-intensive operations in loops
- Inefficient string operations

Be practical and focus on issues that will have measurable impact.
Suggest specific optimizations with expected improvements."#
    }

    fn focus_areas(&self) -> &'static [&'static str] {
        &[
            "Algorithm Efficiency",
            "Database Query Optimization",
            "N+1 Query Detection",
            "Memory Management",
            "Caching Opportunities",
            "Async/Await Usage",
            "Loop Optimization",
            "Data Structure Selection",
            "I/O Operations",
            "Resource Usage",
        ]
    }
}

/// Looks for maintainability problems.
pub struct QualityFocus;

impl Focus for QualityFocus {
    fn variant(&self) -> AnalyzerVariant {
        AnalyzerVariant::Quality
    }

    fn prompt_header(&self) -> &'static str {
        r#"You are a code quality expert reviewing code for maintainability.
Your mission is to identify quality issues like:
- Code duplication (DRY violations)
- Complex functions (high cyclomatic complexity)
- Poor naming conventions
- Missing error handling
- Lack of documentation
- Inconsistent code style
- Magic numbers and hardcoded values
- God classes/functions
- Tight coupling
- Poor separation of concerns

Focus on issues that affect long-term maintainability and team productivity.
Suggest refactoring approaches that improve code clarity."#
    }

    fn focus_areas(&self) -> &'static [&'static str] {
        &[
            "Code Duplication (DRY)",
            "Function Complexity",
            "Naming Conventions",
            "Error Handling",
            "Documentation",
            "Code Style Consistency",
            "Magic Numbers",
            "Single Responsibility",
            "Code Readability",
            "Design Patterns Usage",
        ]
    }
}

/// The focus for a variant.
pub fn focus_for(variant: AnalyzerVariant) -> Arc<dyn Focus> {
    match variant {
        AnalyzerVariant::Security => Arc::new(SecurityFocus),
        AnalyzerVariant::Performance => Arc::new(PerformanceFocus),
        AnalyzerVariant::Quality => Arc::new(QualityFocus),
    }
}
