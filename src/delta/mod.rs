//! Deltas - planned playbook transitions
//!
//! A delta is an ordered list of operations. Nothing happens to a playbook
//! until the delta is handed to the [`DeltaEngine`].

pub mod engine;
pub mod parse;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use engine::{ApplyPolicy, ApplyReport, DeltaEngine, RejectReason, RejectedOperation};
pub use parse::{parse_delta, CandidateOperation, ParsedDelta};

/// One planned change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeltaOperation {
    /// New bullet; the id is assigned at apply time
    Add {
        section: String,
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    },
    /// Replace a bullet's content
    Update { bullet_id: String, content: String },
    /// Increase counters
    Tag {
        bullet_id: String,
        #[serde(default)]
        helpful: u32,
        #[serde(default)]
        harmful: u32,
    },
    /// Delete a bullet; its id is retired
    Remove { bullet_id: String },
}

impl DeltaOperation {
    pub fn add(section: impl Into<String>, content: impl Into<String>) -> Self {
        DeltaOperation::Add {
            section: section.into(),
            content: content.into(),
            tags: Vec::new(),
        }
    }

    pub fn update(bullet_id: impl Into<String>, content: impl Into<String>) -> Self {
        DeltaOperation::Update {
            bullet_id: bullet_id.into(),
            content: content.into(),
        }
    }

    pub fn tag(bullet_id: impl Into<String>, helpful: u32, harmful: u32) -> Self {
        DeltaOperation::Tag {
            bullet_id: bullet_id.into(),
            helpful,
            harmful,
        }
    }

    pub fn remove(bullet_id: impl Into<String>) -> Self {
        DeltaOperation::Remove {
            bullet_id: bullet_id.into(),
        }
    }

    /// Existing bullet this operation refers to (none for ADD)
    pub fn target_id(&self) -> Option<&str> {
        match self {
            DeltaOperation::Add { .. } => None,
            DeltaOperation::Update { bullet_id, .. }
            | DeltaOperation::Tag { bullet_id, .. }
            | DeltaOperation::Remove { bullet_id } => Some(bullet_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DeltaOperation::Add { .. } => "ADD",
            DeltaOperation::Update { .. } => "UPDATE",
            DeltaOperation::Tag { .. } => "TAG",
            DeltaOperation::Remove { .. } => "REMOVE",
        }
    }
}

impl fmt::Display for DeltaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaOperation::Add { section, content, .. } => {
                write!(f, "ADD({}, {:?})", section, crate::truncate_safe(content, 60))
            }
            DeltaOperation::Update { bullet_id, content } => {
                write!(f, "UPDATE({}, {:?})", bullet_id, crate::truncate_safe(content, 60))
            }
            DeltaOperation::Tag {
                bullet_id,
                helpful,
                harmful,
            } => write!(f, "TAG({}, +{}, +{})", bullet_id, helpful, harmful),
            DeltaOperation::Remove { bullet_id } => write!(f, "REMOVE({})", bullet_id),
        }
    }
}

/// An ordered batch of operations plus the curator's reasoning
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaBatch {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub operations: Vec<DeltaOperation>,
}

impl DeltaBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reasoning(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            operations: Vec::new(),
        }
    }

    pub fn push(&mut self, op: DeltaOperation) {
        self.operations.push(op);
    }

    pub fn with(mut self, op: DeltaOperation) -> Self {
        self.operations.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeltaOperation> {
        self.operations.iter()
    }
}

impl FromIterator<DeltaOperation> for DeltaBatch {
    fn from_iter<T: IntoIterator<Item = DeltaOperation>>(iter: T) -> Self {
        Self {
            reasoning: String::new(),
            operations: iter.into_iter().collect(),
        }
    }
}
