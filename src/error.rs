//! Error types for the playbook core
//!
//! Persistence and validation faults are surfaced to callers. Backend and
//! parse faults live next to the backend (`llm`) and are recovered by the
//! learning roles instead of being propagated.

use std::path::PathBuf;
use thiserror::Error;

use crate::delta::RejectedOperation;

/// Errors raised by playbook loading, saving, and delta application
#[derive(Debug, Error)]
pub enum PlaybookError {
    /// Strict-mode delta rejection; the playbook was left untouched
    #[error("delta rejected: {}", describe_rejections(.0))]
    Validation(Vec<RejectedOperation>),

    #[error("failed to read playbook {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write playbook {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("playbook {} is not a valid document: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize playbook: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid bullet record: {0}")]
    InvalidRecord(String),

    /// Compare-and-swap failure: another session saved in between
    #[error(
        "playbook {} changed on disk (expected revision {expected}, found {found})",
        .path.display()
    )]
    Conflict {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
}

impl PlaybookError {
    /// Rejected operations carried by a validation failure
    pub fn rejections(&self) -> &[RejectedOperation] {
        match self {
            PlaybookError::Validation(rejected) => rejected,
            _ => &[],
        }
    }

    /// Validation and conflict errors can be retried after reloading
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlaybookError::Validation(_) | PlaybookError::Conflict { .. })
    }
}

fn describe_rejections(rejected: &[RejectedOperation]) -> String {
    rejected
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{DeltaOperation, RejectReason};

    #[test]
    fn test_validation_error_names_ids() {
        let err = PlaybookError::Validation(vec![RejectedOperation {
            index: 0,
            operation: DeltaOperation::update("nav-00009", "Scroll first"),
            reason: RejectReason::UnknownBullet("nav-00009".to_string()),
        }]);
        let msg = err.to_string();
        assert!(msg.contains("nav-00009"));
        assert!(err.is_recoverable());
        assert_eq!(err.rejections().len(), 1);
    }

    #[test]
    fn test_io_error_not_recoverable() {
        let err = PlaybookError::Write {
            path: PathBuf::from("/tmp/playbook.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!err.is_recoverable());
        assert!(err.rejections().is_empty());
        assert!(err.to_string().contains("/tmp/playbook.json"));
    }
}
