//! Textual overlap between strategy notes

use std::collections::HashSet;

use crate::playbook::Bullet;

/// Token overlap at or above which two notes count as the same strategy
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.70;

/// Lowercase alphanumeric tokens
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard overlap of the two token sets, in [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = tokenize(a);
    let b = tokenize(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f64 / union as f64
}

/// Closest bullet at or above `threshold`
pub fn find_most_similar<'a, I>(content: &str, bullets: I, threshold: f64) -> Option<(&'a Bullet, f64)>
where
    I: IntoIterator<Item = &'a Bullet>,
{
    bullets
        .into_iter()
        .map(|b| (b, similarity(content, b.content())))
        .filter(|(_, score)| *score >= threshold)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}
