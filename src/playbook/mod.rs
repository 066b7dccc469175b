//! Playbook - the persisted, sectioned store of strategy bullets
//!
//! Sections keep discovery order and bullets keep insertion order, so
//! rendering is deterministic. The playbook owns every bullet; callers only
//! get shared references, and all mutation goes through delta application.

pub mod bullet;
pub mod render;
pub mod store;

use serde::Serialize;

pub use bullet::{
    format_bullet_id, is_valid_section_name, normalize_section_name, parse_bullet_id, Bullet,
};
pub use render::{format_bullet_line, wrap_for_external_agent, RenderFilter};
pub use store::PlaybookStore;

use crate::delta::{ApplyPolicy, ApplyReport, DeltaBatch, DeltaEngine};
use crate::error::PlaybookError;

/// A named, ordered bucket of bullets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: String,
    /// Highest sequence ever issued in this section (retired ids included)
    high_water: u64,
    bullets: Vec<Bullet>,
}

impl Section {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            high_water: 0,
            bullets: Vec::new(),
        }
    }

    pub(crate) fn restore(name: String, high_water: u64, bullets: Vec<Bullet>) -> Self {
        Self { name, high_water, bullets }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty()
    }
}

/// Summary counters for a playbook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybookStats {
    pub sections: usize,
    pub bullets: usize,
    pub helpful: u64,
    pub harmful: u64,
    pub revision: u64,
}

/// The full collection of sectioned bullets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playbook {
    sections: Vec<Section>,
    /// Bumped once per delta that changed anything
    revision: u64,
    next_order: u64,
}

impl Playbook {
    /// Create an empty playbook
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(sections: Vec<Section>, revision: u64, next_order: u64) -> Self {
        Self { sections, revision, next_order }
    }

    /// All bullets: section discovery order, then insertion order
    pub fn bullets(&self) -> Vec<&Bullet> {
        self.sections.iter().flat_map(|s| s.bullets.iter()).collect()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Existing section whose name normalizes to the same form as `name`
    pub fn find_section(&self, name: &str) -> Option<&Section> {
        self.section(name).or_else(|| {
            let wanted = normalize_section_name(name);
            self.sections.iter().find(|s| normalize_section_name(&s.name) == wanted)
        })
    }

    /// Number of live bullets
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.bullets.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<&Bullet> {
        let (section, _) = parse_bullet_id(id)?;
        self.section(section)?.bullets.iter().find(|b| b.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn next_order(&self) -> u64 {
        self.next_order
    }

    /// Highest sequence issued for a section; usable as a concurrency high-water mark
    pub fn high_water(&self, section: &str) -> u64 {
        self.section(section).map(|s| s.high_water).unwrap_or(0)
    }

    pub fn stats(&self) -> PlaybookStats {
        let bullets = self.bullets();
        PlaybookStats {
            sections: self.sections.len(),
            bullets: bullets.len(),
            helpful: bullets.iter().map(|b| u64::from(b.helpful())).sum(),
            harmful: bullets.iter().map(|b| u64::from(b.harmful())).sum(),
            revision: self.revision,
        }
    }

    /// Validate and apply a delta under the given policy
    pub fn apply(&mut self, delta: &DeltaBatch, policy: ApplyPolicy) -> Result<ApplyReport, PlaybookError> {
        DeltaEngine::new(policy).apply(self, delta)
    }

    /// Load a playbook from a JSON document
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, PlaybookError> {
        PlaybookStore::new(path.as_ref()).load()
    }

    /// Atomically write the playbook to a JSON document
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), PlaybookError> {
        PlaybookStore::new(path.as_ref()).save(self)
    }

    // --- Mutation primitives, only reachable through the delta engine ---

    /// Append a bullet, creating the section on first use. Returns the new id.
    pub(crate) fn insert_bullet(&mut self, section: &str, content: &str, tags: Vec<String>) -> String {
        let order = self.next_order;
        self.next_order = self.next_order.saturating_add(1);

        let idx = match self.sections.iter().position(|s| s.name == section) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section::new(section));
                self.sections.len() - 1
            }
        };
        let target = &mut self.sections[idx];
        // Validation rejects ADDs past the last sequence
        target.high_water = target.high_water.saturating_add(1);
        let bullet = Bullet::new(section, target.high_water, order, content, tags);
        let id = bullet.id().to_string();
        target.bullets.push(bullet);
        id
    }

    pub(crate) fn replace_content(&mut self, id: &str, content: &str) -> bool {
        match self.get_mut(id) {
            Some(bullet) => {
                bullet.replace_content(content);
                true
            }
            None => false,
        }
    }

    pub(crate) fn add_counts(&mut self, id: &str, helpful: u32, harmful: u32) -> bool {
        match self.get_mut(id) {
            Some(bullet) => {
                bullet.add_counts(helpful, harmful);
                true
            }
            None => false,
        }
    }

    /// Remove a bullet; its id stays retired because the high-water mark is kept
    pub(crate) fn remove_bullet(&mut self, id: &str) -> Option<Bullet> {
        let (section, _) = parse_bullet_id(id)?;
        let target = self.sections.iter_mut().find(|s| s.name == section)?;
        let pos = target.bullets.iter().position(|b| b.id() == id)?;
        Some(target.bullets.remove(pos))
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision = self.revision.saturating_add(1);
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Bullet> {
        let (section, _) = parse_bullet_id(id)?;
        self.sections
            .iter_mut()
            .find(|s| s.name == section)?
            .bullets
            .iter_mut()
            .find(|b| b.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_playbook() {
        let playbook = Playbook::new();
        assert!(playbook.is_empty());
        assert!(playbook.bullets().is_empty());
        assert_eq!(playbook.render(None), "");
        assert_eq!(playbook.stats(), PlaybookStats::default());
    }

    #[test]
    fn test_insert_assigns_per_section_sequences() {
        let mut playbook = Playbook::new();
        let a = playbook.insert_bullet("nav", "Scroll into view before clicking", vec![]);
        let b = playbook.insert_bullet("validation", "Check for null before dereferencing", vec![]);
        let c = playbook.insert_bullet("nav", "Wait for the page to settle", vec![]);

        assert_eq!(a, "nav-00001");
        assert_eq!(b, "validation-00001");
        assert_eq!(c, "nav-00002");

        let ids: Vec<&str> = playbook.bullets().iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec!["nav-00001", "nav-00002", "validation-00001"]);

        let orders: Vec<u64> = playbook.bullets().iter().map(|b| b.order()).collect();
        assert_eq!(orders, vec![0, 2, 1]);
    }

    #[test]
    fn test_removed_ids_are_not_reused() {
        let mut playbook = Playbook::new();
        let first = playbook.insert_bullet("nav", "Scroll first", vec![]);
        assert!(playbook.remove_bullet(&first).is_some());
        assert!(!playbook.contains(&first));

        let second = playbook.insert_bullet("nav", "Scroll first, then click", vec![]);
        assert_eq!(second, "nav-00002");
        assert_eq!(playbook.high_water("nav"), 2);
        // Emptied sections keep their place
        assert_eq!(playbook.sections().len(), 1);
    }

    #[test]
    fn test_get_and_mutate() {
        let mut playbook = Playbook::new();
        let id = playbook.insert_bullet("math", "Show your work", vec!["arith".to_string()]);

        assert!(playbook.add_counts(&id, 2, 1));
        assert!(playbook.replace_content(&id, "Show every intermediate step"));
        assert!(!playbook.add_counts("math-00099", 1, 0));
        assert!(!playbook.replace_content("bogus", "x"));

        let bullet = playbook.get(&id).unwrap();
        assert_eq!(bullet.content(), "Show every intermediate step");
        assert_eq!((bullet.helpful(), bullet.harmful()), (2, 1));
        assert_eq!(bullet.net_score(), 1);
        assert_eq!(bullet.tags(), ["arith".to_string()]);

        let stats = playbook.stats();
        assert_eq!(stats.bullets, 1);
        assert_eq!(stats.helpful, 2);
        assert_eq!(stats.harmful, 1);
    }
}
