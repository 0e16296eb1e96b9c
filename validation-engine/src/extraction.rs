//! Candidate-term extraction from raw dictation text.

use itertools::Itertools;

/// Dictation filler and connective words that never make useful
/// knowledge-base lookup terms.
const STOP_WORDS: &[&str] = &[
    // Articles, connectives, prepositions
    "a", "an", "and", "as", "at", "by", "for", "from", "in", "into", "is", "it", "of", "on", "or",
    "per", "the", "to", "was", "were", "with", "without",
    // Dictation filler
    "patient", "patients", "please", "history", "hx", "presents", "presenting", "presented",
    "complains", "complaining", "complaint", "denies", "reports", "reported", "noted", "states",
    "exam", "status", "recent", "known", "new", "no", "not", "none", "normal",
    // Ordering boilerplate
    "order", "ordered", "ordering", "request", "requested", "requesting", "rule", "out",
    "evaluate", "evaluation", "eval", "assess", "assessment", "check", "consider", "recommend",
    "recommended", "study", "imaging", "needed", "indicated",
    // Time words
    "ago", "day", "days", "week", "weeks", "month", "months", "year", "years", "since", "prior",
    "now", "today", "currently",
];

/// Pure, deterministic keyword extraction.
///
/// Tokens are lowercased runs of letters, digits, and interior hyphens;
/// stop words, single characters, and pure-numeric tokens are dropped and
/// the remainder is deduplicated in first-occurrence order.
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn extract(raw: &str) -> Vec<String> {
        raw.to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .map(|token| token.trim_matches('-'))
            .filter(|token| token.chars().count() > 1)
            .filter(|token| !token.chars().all(|c| c.is_ascii_digit()))
            .filter(|token| !STOP_WORDS.contains(token))
            .map(|token| token.to_string())
            .unique()
            .collect()
    }
}
