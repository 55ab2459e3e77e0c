//! Ranking primitives shared by every store backend.

use crate::models::{PatternMatch, ReferencePattern};
use std::cmp::Ordering;

/// Similarity reported for lexical matches, which are not truly ranked.
pub const LEXICAL_SIMILARITY: f32 = 0.5;

/// Cosine distance in `[0, 2]`, or `None` when the vectors cannot be
/// compared (different dimensions, empty, or zero magnitude).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let cosine = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    Some(1.0 - cosine)
}

fn to_match(pattern: &ReferencePattern, similarity: f32) -> PatternMatch {
    PatternMatch {
        snippet: pattern.snippet.clone(),
        name: pattern.name.clone(),
        description: pattern.description.clone(),
        similarity,
    }
}

/// Rank patterns by ascending cosine distance to `query` and keep the top
/// `limit`. Patterns without a comparable embedding are skipped.
pub fn rank_by_embedding<'a>(
    patterns: impl IntoIterator<Item = &'a ReferencePattern>,
    query: &[f32],
    limit: usize,
) -> Vec<PatternMatch> {
    let mut scored: Vec<(f32, &ReferencePattern)> = patterns
        .into_iter()
        .filter_map(|p| {
            let embedding = p.embedding.as_deref()?;
            cosine_distance(embedding, query).map(|d| (d, p))
        })
        .collect();

    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    scored.truncate(limit);

    scored
        .into_iter()
        .map(|(distance, p)| to_match(p, 1.0 - distance))
        .collect()
}

/// Case-insensitive containment of `query` in each snippet, up to `limit`.
pub fn lexical_matches<'a>(
    patterns: impl IntoIterator<Item = &'a ReferencePattern>,
    query: &str,
    limit: usize,
) -> Vec<PatternMatch> {
    let needle = query.to_lowercase();
    patterns
        .into_iter()
        .filter(|p| p.snippet.to_lowercase().contains(&needle))
        .take(limit)
        .map(|p| to_match(p, LEXICAL_SIMILARITY))
        .collect()
}
