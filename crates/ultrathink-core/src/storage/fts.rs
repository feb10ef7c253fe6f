//! FTS5 query rewriting
//!
//! FTS5's implicit AND between terms gives zero recall on multi-word natural
//! language queries, so whitespace-separated terms are rewritten into an
//! OR-join and ranking surfaces documents matching any term. Queries that
//! already carry an explicit boolean operator pass through untouched.

const OPERATORS: &[&str] = &["AND", "OR", "NOT", "NEAR"];

/// Rewrite a raw user query into an FTS5 MATCH expression.
///
/// - explicit AND / OR / NOT / NEAR: passed through as written
/// - otherwise: terms shorter than 2 chars dropped, each remaining term
///   quoted (embedded double quotes doubled), OR-joined
///
/// Returns an empty string when nothing searchable remains; callers treat
/// that as an empty result set.
pub fn rewrite_match_query(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if trimmed
        .split_whitespace()
        .any(|token| OPERATORS.contains(&token))
    {
        return trimmed.to_string();
    }

    let terms: Vec<String> = trimmed
        .split_whitespace()
        .filter(|term| term.chars().count() >= 2)
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();

    terms.join(" OR ")
}
