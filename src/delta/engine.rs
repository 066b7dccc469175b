//! Delta Engine - validate everything, then mutate
//!
//! Validation walks the delta in order against a simulated id set, so an
//! operation may refer to a bullet added earlier in the same delta and is
//! rejected if it refers to one removed earlier. Mutation only starts once
//! the whole delta has been checked.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

use super::{DeltaBatch, DeltaOperation};
use crate::error::PlaybookError;
use crate::playbook::{format_bullet_id, is_valid_section_name, Playbook};

/// What to do when some operations fail validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyPolicy {
    /// Reject the whole delta; the playbook stays unchanged
    #[default]
    Strict,
    /// Apply the valid operations and report the rest
    Lenient,
}

impl fmt::Display for ApplyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyPolicy::Strict => write!(f, "strict"),
            ApplyPolicy::Lenient => write!(f, "lenient"),
        }
    }
}

impl std::str::FromStr for ApplyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(ApplyPolicy::Strict),
            "lenient" => Ok(ApplyPolicy::Lenient),
            other => Err(format!("unknown apply policy '{}'", other)),
        }
    }
}

/// Why an operation failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UnknownBullet(String),
    InvalidSection(String),
    EmptyContent,
    /// The section's id counter cannot advance
    SequenceExhausted(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnknownBullet(id) => write!(f, "unknown bullet id '{}'", id),
            RejectReason::InvalidSection(name) => write!(f, "invalid section name '{}'", name),
            RejectReason::EmptyContent => write!(f, "empty content"),
            RejectReason::SequenceExhausted(section) => write!(f, "no ids left in section '{}'", section),
        }
    }
}

/// An operation that did not pass validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOperation {
    /// Position in the delta
    pub index: usize,
    pub operation: DeltaOperation,
    pub reason: RejectReason,
}

impl fmt::Display for RejectedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.index, self.operation, self.reason)
    }
}

/// Outcome of applying a delta
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    /// Ids assigned to ADDs, in delta order
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub tagged: Vec<String>,
    pub removed: Vec<String>,
    pub rejected: Vec<RejectedOperation>,
    /// Playbook revision after the apply
    pub revision: u64,
}

impl ApplyReport {
    pub fn changed(&self) -> bool {
        self.applied > 0
    }

    /// True when a lenient apply skipped something
    pub fn is_partial(&self) -> bool {
        !self.rejected.is_empty()
    }
}

impl fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied {} (added {}, updated {}, tagged {}, removed {}), rejected {}, revision {}",
            self.applied,
            self.added.len(),
            self.updated.len(),
            self.tagged.len(),
            self.removed.len(),
            self.rejected.len(),
            self.revision
        )
    }
}

/// Validates and applies deltas under one policy
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaEngine {
    policy: ApplyPolicy,
}

impl DeltaEngine {
    pub fn new(policy: ApplyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ApplyPolicy {
        self.policy
    }

    /// Check every operation in order without touching the playbook.
    ///
    /// Returns the indices of accepted operations and the rejections.
    pub fn validate(&self, playbook: &Playbook, delta: &DeltaBatch) -> (Vec<usize>, Vec<RejectedOperation>) {
        let mut live: HashSet<String> = playbook.bullets().iter().map(|b| b.id().to_string()).collect();
        let mut high_water: HashMap<String, u64> = HashMap::new();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for (index, op) in delta.iter().enumerate() {
            let verdict = match op {
                DeltaOperation::Add { section, content, .. } => {
                    if !is_valid_section_name(section) {
                        Err(RejectReason::InvalidSection(section.clone()))
                    } else if content.trim().is_empty() {
                        Err(RejectReason::EmptyContent)
                    } else {
                        let seq = high_water
                            .entry(section.clone())
                            .or_insert_with(|| playbook.high_water(section));
                        match seq.checked_add(1) {
                            Some(next) => {
                                *seq = next;
                                live.insert(format_bullet_id(section, next));
                                Ok(())
                            }
                            None => Err(RejectReason::SequenceExhausted(section.clone())),
                        }
                    }
                }
                DeltaOperation::Update { bullet_id, content } => {
                    if !live.contains(bullet_id) {
                        Err(RejectReason::UnknownBullet(bullet_id.clone()))
                    } else if content.trim().is_empty() {
                        Err(RejectReason::EmptyContent)
                    } else {
                        Ok(())
                    }
                }
                DeltaOperation::Tag { bullet_id, .. } => {
                    if live.contains(bullet_id) {
                        Ok(())
                    } else {
                        Err(RejectReason::UnknownBullet(bullet_id.clone()))
                    }
                }
                DeltaOperation::Remove { bullet_id } => {
                    if live.remove(bullet_id) {
                        Ok(())
                    } else {
                        Err(RejectReason::UnknownBullet(bullet_id.clone()))
                    }
                }
            };

            match verdict {
                Ok(()) => accepted.push(index),
                Err(reason) => rejected.push(RejectedOperation {
                    index,
                    operation: op.clone(),
                    reason,
                }),
            }
        }

        (accepted, rejected)
    }

    /// Validate the whole delta, then apply it.
    ///
    /// Strict: any rejection returns `PlaybookError::Validation` and the
    /// playbook is untouched. Lenient: valid operations are applied and the
    /// rejections come back in the report.
    pub fn apply(&self, playbook: &mut Playbook, delta: &DeltaBatch) -> Result<ApplyReport, PlaybookError> {
        let (accepted, rejected) = self.validate(playbook, delta);

        if !rejected.is_empty() {
            match self.policy {
                ApplyPolicy::Strict => {
                    warn!("Rejected delta of {} operations: {} invalid", delta.len(), rejected.len());
                    return Err(PlaybookError::Validation(rejected));
                }
                ApplyPolicy::Lenient => {
                    for r in &rejected {
                        warn!("Skipping operation {}", r);
                    }
                }
            }
        }

        let mut report = ApplyReport {
            rejected,
            ..Default::default()
        };

        for index in accepted {
            let op = &delta.operations[index];
            match op {
                DeltaOperation::Add { section, content, tags } => {
                    let id = playbook.insert_bullet(section, content.trim(), tags.clone());
                    debug!("Added {}", id);
                    report.added.push(id);
                }
                DeltaOperation::Update { bullet_id, content } => {
                    playbook.replace_content(bullet_id, content.trim());
                    debug!("Updated {}", bullet_id);
                    report.updated.push(bullet_id.clone());
                }
                DeltaOperation::Tag {
                    bullet_id,
                    helpful,
                    harmful,
                } => {
                    playbook.add_counts(bullet_id, *helpful, *harmful);
                    debug!("Tagged {} (+{} helpful, +{} harmful)", bullet_id, helpful, harmful);
                    report.tagged.push(bullet_id.clone());
                }
                DeltaOperation::Remove { bullet_id } => {
                    playbook.remove_bullet(bullet_id);
                    debug!("Removed {}", bullet_id);
                    report.removed.push(bullet_id.clone());
                }
            }
            report.applied += 1;
        }

        if report.changed() {
            playbook.bump_revision();
        }
        report.revision = playbook.revision();
        Ok(report)
    }
}
