//! Bullets - single atomic strategy notes
//!
//! A bullet's identifier is assigned by the playbook from a per-section
//! counter and never changes. Content only changes through an UPDATE.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Width of the zero-padded sequence part of a bullet id
pub const SEQUENCE_WIDTH: usize = 5;

/// Longest accepted section name
pub const MAX_SECTION_LEN: usize = 64;

/// A single strategy entry in the playbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bullet {
    id: String,
    section: String,
    content: String,
    helpful: u32,
    harmful: u32,
    order: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Bullet {
    pub(crate) fn new(
        section: &str,
        sequence: u64,
        order: u64,
        content: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format_bullet_id(section, sequence),
            section: section.to_string(),
            content: content.into(),
            helpful: 0,
            harmful: 0,
            order,
            tags,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a bullet from persisted fields
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: String,
        section: String,
        content: String,
        helpful: u32,
        harmful: u32,
        order: u64,
        tags: Vec<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, section, content, helpful, harmful, order, tags, created_at, updated_at }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn helpful(&self) -> u32 {
        self.helpful
    }

    pub fn harmful(&self) -> u32 {
        self.harmful
    }

    /// Global creation order across all sections
    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Helpful minus harmful
    pub fn net_score(&self) -> i64 {
        i64::from(self.helpful) - i64::from(self.harmful)
    }

    /// Sequence number parsed back out of the id
    pub fn sequence(&self) -> u64 {
        parse_bullet_id(&self.id).map(|(_, seq)| seq).unwrap_or(0)
    }

    pub(crate) fn replace_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.updated_at = Utc::now();
    }

    pub(crate) fn add_counts(&mut self, helpful: u32, harmful: u32) {
        self.helpful = self.helpful.saturating_add(helpful);
        self.harmful = self.harmful.saturating_add(harmful);
        self.updated_at = Utc::now();
    }
}

/// Format `<section>-<zero padded sequence>`
pub fn format_bullet_id(section: &str, sequence: u64) -> String {
    format!("{}-{:0width$}", section, sequence, width = SEQUENCE_WIDTH)
}

/// Split an id into its section and sequence parts
pub fn parse_bullet_id(id: &str) -> Option<(&str, u64)> {
    let (section, seq) = id.rsplit_once('-')?;
    if !is_valid_section_name(section) || seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    seq.parse().ok().map(|n| (section, n))
}

/// Section names: ASCII alphanumeric start, then alphanumerics or `_`
pub fn is_valid_section_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    name.len() <= MAX_SECTION_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Best-effort cleanup of a free-text section name into a valid one
pub fn normalize_section_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    trimmed.chars().take(MAX_SECTION_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bullet_id() {
        assert_eq!(format_bullet_id("validation", 1), "validation-00001");
        assert_eq!(format_bullet_id("nav", 42), "nav-00042");
        assert_eq!(format_bullet_id("nav", 123456), "nav-123456");
    }

    #[test]
    fn test_parse_bullet_id() {
        assert_eq!(parse_bullet_id("navigation-00042"), Some(("navigation", 42)));
        assert_eq!(parse_bullet_id("data_loading-00003"), Some(("data_loading", 3)));
        assert_eq!(parse_bullet_id("navigation"), None);
        assert_eq!(parse_bullet_id("navigation-"), None);
        assert_eq!(parse_bullet_id("-00001"), None);
        assert_eq!(parse_bullet_id("nav-00a1"), None);
    }

    #[test]
    fn test_section_names() {
        assert!(is_valid_section_name("validation"));
        assert!(is_valid_section_name("data_loading"));
        assert!(is_valid_section_name("General"));
        assert!(!is_valid_section_name(""));
        assert!(!is_valid_section_name("_hidden"));
        assert!(!is_valid_section_name("two words"));
        assert!(!is_valid_section_name("with-dash"));
        assert!(!is_valid_section_name(&"a".repeat(MAX_SECTION_LEN + 1)));
    }

    #[test]
    fn test_normalize_section_name() {
        assert_eq!(normalize_section_name("Data Loading"), "data_loading");
        assert_eq!(normalize_section_name("  error-handling "), "error_handling");
        assert_eq!(normalize_section_name("UI / forms!"), "ui_forms");
        assert_eq!(normalize_section_name("___"), "");
    }

    #[test]
    fn test_counts_saturate() {
        let mut bullet = Bullet::new("nav", 1, 0, "Scroll before clicking", vec![]);
        bullet.add_counts(u32::MAX, 2);
        bullet.add_counts(5, 0);
        assert_eq!(bullet.helpful(), u32::MAX);
        assert_eq!(bullet.harmful(), 2);
        assert_eq!(bullet.sequence(), 1);
    }
}
