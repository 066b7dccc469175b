//! Playbook Store - JSON persistence with atomic replacement
//!
//! The document keeps section and bullet order (serde_json `preserve_order`)
//! and the per-section sequence high-water marks, so ids retired before a
//! save are still never reissued after a reload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{is_valid_section_name, parse_bullet_id, Bullet, Playbook, Section};
use crate::error::PlaybookError;

/// One bullet as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BulletRecord {
    id: String,
    content: String,
    #[serde(default)]
    helpful: u32,
    #[serde(default)]
    harmful: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<&Bullet> for BulletRecord {
    fn from(bullet: &Bullet) -> Self {
        Self {
            id: bullet.id().to_string(),
            content: bullet.content().to_string(),
            helpful: bullet.helpful(),
            harmful: bullet.harmful(),
            order: Some(bullet.order()),
            tags: bullet.tags().to_vec(),
            created_at: Some(bullet.created_at()),
            updated_at: Some(bullet.updated_at()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PlaybookDocument {
    #[serde(default)]
    revision: u64,
    #[serde(default)]
    sequences: BTreeMap<String, u64>,
    #[serde(default)]
    sections: Map<String, Value>,
}

impl PlaybookDocument {
    fn from_playbook(playbook: &Playbook) -> Result<Self, PlaybookError> {
        let mut sections = Map::new();
        let mut sequences = BTreeMap::new();
        for section in playbook.sections() {
            let records: Vec<BulletRecord> = section.bullets().iter().map(BulletRecord::from).collect();
            let value = serde_json::to_value(records).map_err(PlaybookError::Serialize)?;
            sections.insert(section.name().to_string(), value);
            sequences.insert(section.name().to_string(), section.high_water());
        }
        Ok(Self {
            revision: playbook.revision(),
            sequences,
            sections,
        })
    }

    fn into_playbook(self) -> Result<Playbook, PlaybookError> {
        let mut seen_ids = HashSet::new();
        let mut sections = Vec::with_capacity(self.sections.len());
        let mut next_order = 0u64;

        for (name, value) in self.sections {
            if !is_valid_section_name(&name) {
                return Err(PlaybookError::InvalidRecord(format!("invalid section name '{}'", name)));
            }
            let records: Vec<BulletRecord> = serde_json::from_value(value)
                .map_err(|e| PlaybookError::InvalidRecord(format!("section '{}': {}", name, e)))?;

            let mut high_water = self.sequences.get(&name).copied().unwrap_or(0);
            let mut bullets = Vec::with_capacity(records.len());
            for record in records {
                let sequence = match parse_bullet_id(&record.id) {
                    Some((section, seq)) if section == name => seq,
                    _ => {
                        return Err(PlaybookError::InvalidRecord(format!(
                            "id '{}' does not belong to section '{}'",
                            record.id, name
                        )))
                    }
                };
                if !seen_ids.insert(record.id.clone()) {
                    return Err(PlaybookError::InvalidRecord(format!("duplicate id '{}'", record.id)));
                }
                high_water = high_water.max(sequence);

                // Hand-written documents may omit order and timestamps
                let order = record.order.unwrap_or(next_order);
                next_order = next_order.max(order.saturating_add(1));
                let created_at = record.created_at.unwrap_or_else(Utc::now);
                let updated_at = record.updated_at.unwrap_or(created_at);

                bullets.push(Bullet::restore(
                    record.id,
                    name.clone(),
                    record.content,
                    record.helpful,
                    record.harmful,
                    order,
                    record.tags,
                    created_at,
                    updated_at,
                ));
            }
            sections.push(Section::restore(name, high_water, bullets));
        }

        Ok(Playbook::from_parts(sections, self.revision, next_order))
    }
}

/// File-backed playbook persistence
#[derive(Debug, Clone)]
pub struct PlaybookStore {
    path: PathBuf,
}

impl PlaybookStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the platform data directory
    pub fn default_location() -> anyhow::Result<Self> {
        Ok(Self::new(crate::config::data_dir()?.join("playbook.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the playbook; a missing file is an empty playbook
    pub fn load(&self) -> Result<Playbook, PlaybookError> {
        if !self.path.exists() {
            debug!("No playbook at {}, starting empty", self.path.display());
            return Ok(Playbook::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| PlaybookError::Read {
            path: self.path.clone(),
            source,
        })?;
        let document: PlaybookDocument =
            serde_json::from_str(&content).map_err(|source| PlaybookError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        let playbook = document.into_playbook()?;
        debug!(
            "Loaded playbook {} ({} bullets, revision {})",
            self.path.display(),
            playbook.len(),
            playbook.revision()
        );
        Ok(playbook)
    }

    /// Revision currently on disk; 0 when the file does not exist
    pub fn persisted_revision(&self) -> Result<u64, PlaybookError> {
        #[derive(Deserialize)]
        struct RevisionOnly {
            #[serde(default)]
            revision: u64,
        }

        if !self.path.exists() {
            return Ok(0);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| PlaybookError::Read {
            path: self.path.clone(),
            source,
        })?;
        let doc: RevisionOnly = serde_json::from_str(&content).map_err(|source| PlaybookError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        Ok(doc.revision)
    }

    /// Write the playbook through a temp file in the same directory, then rename over the target
    pub fn save(&self, playbook: &Playbook) -> Result<(), PlaybookError> {
        let document = PlaybookDocument::from_playbook(playbook)?;
        let json = serde_json::to_string_pretty(&document).map_err(PlaybookError::Serialize)?;

        let write_err = |source: std::io::Error| PlaybookError::Write {
            path: self.path.clone(),
            source,
        };

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        info!(
            "Saved playbook {} ({} bullets, revision {})",
            self.path.display(),
            playbook.len(),
            playbook.revision()
        );
        Ok(())
    }

    /// Save only if the file still holds `base_revision`.
    ///
    /// Guards `load -> mutate -> save` across sessions sharing one file.
    pub fn save_checked(&self, playbook: &Playbook, base_revision: u64) -> Result<(), PlaybookError> {
        let found = self.persisted_revision()?;
        if found != base_revision {
            return Err(PlaybookError::Conflict {
                path: self.path.clone(),
                expected: base_revision,
                found,
            });
        }
        self.save(playbook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{ApplyPolicy, DeltaBatch, DeltaOperation, RejectReason};
    use tempfile::TempDir;

    fn seeded() -> Playbook {
        let mut playbook = Playbook::new();
        let a = playbook.insert_bullet("navigation", "Scroll the element into view", vec!["ui".into()]);
        playbook.insert_bullet("validation", "Check for null before dereferencing", vec![]);
        playbook.insert_bullet("navigation", "Wait for network idle", vec![]);
        playbook.add_counts(&a, 4, 1);
        playbook.bump_revision();
        playbook
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = PlaybookStore::new(dir.path().join("playbook.json"));
        let playbook = seeded();

        store.save(&playbook).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, playbook);
        assert_eq!(loaded.render(None), playbook.render(None));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = PlaybookStore::new(dir.path().join("nope.json"));
        assert!(store.load().unwrap().is_empty());
        assert_eq!(store.persisted_revision().unwrap(), 0);
    }

    #[test]
    fn test_document_shape() {
        let dir = TempDir::new().unwrap();
        let store = PlaybookStore::new(dir.path().join("playbook.json"));
        store.save(&seeded()).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["revision"], 1);
        assert_eq!(value["sequences"]["navigation"], 2);
        let keys: Vec<&String> = value["sections"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["navigation", "validation"]);
        assert_eq!(value["sections"]["navigation"][0]["id"], "navigation-00001");
        assert_eq!(value["sections"]["navigation"][0]["helpful"], 4);
    }

    #[test]
    fn test_minimal_document_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("playbook.json");
        std::fs::write(
            &path,
            r#"{"sections": {"general": [{"id": "general-00003", "content": "Verify inputs", "helpful": 2, "harmful": 0}]}}"#,
        )
        .unwrap();

        let playbook = PlaybookStore::new(&path).load().unwrap();
        assert_eq!(playbook.len(), 1);
        assert_eq!(playbook.high_water("general"), 3);
        assert_eq!(playbook.get("general-00003").unwrap().helpful(), 2);
    }

    #[test]
    fn test_rejects_invalid_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("playbook.json");

        std::fs::write(&path, r#"{"sections": {"nav": [{"id": "other-00001", "content": "x"}]}}"#).unwrap();
        assert!(matches!(PlaybookStore::new(&path).load(), Err(PlaybookError::InvalidRecord(_))));

        std::fs::write(
            &path,
            r#"{"sections": {"nav": [{"id": "nav-00001", "content": "x"}, {"id": "nav-00001", "content": "y"}]}}"#,
        )
        .unwrap();
        assert!(matches!(PlaybookStore::new(&path).load(), Err(PlaybookError::InvalidRecord(_))));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(PlaybookStore::new(&path).load(), Err(PlaybookError::Corrupt { .. })));
    }

    #[test]
    fn test_exhausted_sequence_rejects_add() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("playbook.json");
        std::fs::write(&path, r#"{"sequences": {"nav": 18446744073709551615}, "sections": {"nav": []}}"#).unwrap();

        let mut playbook = PlaybookStore::new(&path).load().unwrap();
        assert_eq!(playbook.high_water("nav"), u64::MAX);

        let delta = DeltaBatch::new().with(DeltaOperation::add("nav", "Scroll the element into view"));
        let err = playbook.apply(&delta, ApplyPolicy::Strict).unwrap_err();
        assert_eq!(err.rejections()[0].reason, RejectReason::SequenceExhausted("nav".into()));

        let report = playbook.apply(&delta, ApplyPolicy::Lenient).unwrap();
        assert!(report.added.is_empty());
        assert_eq!(report.rejected.len(), 1);
        assert!(playbook.is_empty());
        assert_eq!(playbook.high_water("nav"), u64::MAX);
    }

    #[test]
    fn test_save_checked_conflict() {
        let dir = TempDir::new().unwrap();
        let store = PlaybookStore::new(dir.path().join("playbook.json"));
        let playbook = seeded();

        store.save_checked(&playbook, 0).unwrap();
        let err = store.save_checked(&playbook, 0).unwrap_err();
        assert!(matches!(err, PlaybookError::Conflict { expected: 0, found: 1, .. }));
        store.save_checked(&playbook, 1).unwrap();
    }
}
