//! Citation extraction - bullet ids referenced in free text as `[section-00042]`
//!
//! Purely syntactic. Whether a cited id exists is the caller's question.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static CITATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([A-Za-z0-9][A-Za-z0-9_]*-\d+)\]").expect("citation pattern is valid")
});

/// Ids cited in `text`, deduplicated, in order of first appearance
pub fn extract_citations(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    CITATION_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Union several id lists, keeping first-appearance order
pub fn merge_citations<'a, I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for id in list {
            let id = id.trim().trim_start_matches('[').trim_end_matches(']');
            if !id.is_empty() && seen.insert(id.to_string()) {
                merged.push(id.to_string());
            }
        }
    }
    merged
}
