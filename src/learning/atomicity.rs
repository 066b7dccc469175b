//! Atomicity scoring - does a note carry exactly one actionable idea?
//!
//! A cheap heuristic in [0, 1]. It starts at 1.0 and subtracts penalties
//! for length, extra sentences, compound connectors, and vague phrasing.

/// Candidates scoring below this are dropped
pub const DEFAULT_MIN_ATOMICITY: f64 = 0.50;

const CONNECTORS: &[&str] = &[" and also ", " as well as ", "; ", " additionally", " furthermore", " also "];

const VAGUE_PHRASES: &[&str] = &[
    "be careful",
    "do better",
    "pay attention",
    "be smart",
    "try harder",
    "things",
    "stuff",
    "etc",
    "various",
    "in general",
    "generally",
    "make sure everything",
];

/// Heuristic atomicity score of a candidate note
pub fn atomicity_score(content: &str) -> f64 {
    let text = content.trim();
    if text.is_empty() {
        return 0.0;
    }
    let lower = format!(" {} ", text.to_lowercase());
    let words = text.split_whitespace().count();

    let mut score: f64 = 1.0;

    if words < 3 {
        score -= 0.4;
    } else if words > 40 {
        score -= 0.4;
    } else if words > 25 {
        score -= 0.2;
    }

    let sentences = text
        .split(|c| matches!(c, '.' | '!' | '?'))
        .filter(|s| s.split_whitespace().count() >= 2)
        .count();
    if sentences > 1 {
        score -= 0.15 * (sentences - 1).min(3) as f64;
    }

    let connectors = CONNECTORS.iter().filter(|c| lower.contains(*c)).count();
    score -= 0.15 * connectors.min(2) as f64;

    let and_count = lower.matches(" and ").count();
    if and_count >= 2 {
        score -= 0.1 * (and_count - 1).min(3) as f64;
    }

    if VAGUE_PHRASES.iter().any(|p| lower.contains(&format!(" {}", p))) {
        score -= 0.3;
    }

    score.clamp(0.0, 1.0)
}

/// Heuristic score, capped by the backend's own estimate when it gave one
pub fn combined_score(content: &str, hint: Option<f64>) -> f64 {
    let heuristic = atomicity_score(content);
    match hint {
        Some(h) => heuristic.min(h.clamp(0.0, 1.0)),
        None => heuristic,
    }
}
