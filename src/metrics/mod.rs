//! Learning metrics
//!
//! Learning failures never reach the task caller, so counters here are the
//! place they show up. Shared through `Arc<RwLock<..>>`, safe to read while
//! cycles run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::Outcome;

/// One learning cycle, as recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: Outcome,
    pub degraded_reflection: bool,
    pub degraded_curation: bool,
    pub operations_proposed: usize,
    pub operations_applied: usize,
    pub operations_rejected: usize,
    pub dedup_merges: usize,
    pub atomicity_rejections: usize,
    /// Strict-mode rejection of the whole delta
    pub validation_failed: bool,
    /// None when nothing was saved
    pub persisted: Option<bool>,
}

impl CycleRecord {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            duration_ms: 0,
            outcome,
            degraded_reflection: false,
            degraded_curation: false,
            operations_proposed: 0,
            operations_applied: 0,
            operations_rejected: 0,
            dedup_merges: 0,
            atomicity_rejections: 0,
            validation_failed: false,
            persisted: None,
        }
    }

    pub fn finish(&mut self) {
        self.duration_ms = (Utc::now() - self.started_at).num_milliseconds().max(0) as u64;
    }
}

/// Aggregate counters across cycles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub session_start: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub cycles: u64,
    pub successes: u64,
    pub failures: u64,
    pub partials: u64,
    pub degraded_reflections: u64,
    pub degraded_curations: u64,
    pub empty_deltas: u64,
    pub operations_applied: u64,
    pub operations_rejected: u64,
    pub dedup_merges: u64,
    pub atomicity_rejections: u64,
    pub validation_failures: u64,
    pub persistence_failures: u64,
    pub total_duration_ms: u64,
}

impl LearningMetrics {
    pub fn avg_cycle_ms(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.cycles as f64
        }
    }

    /// Share of cycles whose reflection had to fall back
    pub fn degradation_rate(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.degraded_reflections as f64 / self.cycles as f64
        }
    }
}

/// Shared metrics sink for a learning loop
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    metrics: Arc<RwLock<LearningMetrics>>,
    recent: Arc<RwLock<Vec<CycleRecord>>>,
    max_recent: usize,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(LearningMetrics {
                session_start: Some(Utc::now()),
                ..Default::default()
            })),
            recent: Arc::new(RwLock::new(Vec::new())),
            max_recent: 200,
        }
    }

    pub async fn record(&self, record: CycleRecord) {
        let mut metrics = self.metrics.write().await;
        metrics.cycles += 1;
        match record.outcome {
            Outcome::Success => metrics.successes += 1,
            Outcome::Failure => metrics.failures += 1,
            Outcome::Partial => metrics.partials += 1,
        }
        if record.degraded_reflection {
            metrics.degraded_reflections += 1;
        }
        if record.degraded_curation {
            metrics.degraded_curations += 1;
        }
        if record.operations_proposed == 0 {
            metrics.empty_deltas += 1;
        }
        if record.validation_failed {
            metrics.validation_failures += 1;
        }
        if record.persisted == Some(false) {
            metrics.persistence_failures += 1;
        }
        metrics.operations_applied += record.operations_applied as u64;
        metrics.operations_rejected += record.operations_rejected as u64;
        metrics.dedup_merges += record.dedup_merges as u64;
        metrics.atomicity_rejections += record.atomicity_rejections as u64;
        metrics.total_duration_ms += record.duration_ms;
        metrics.last_updated = Some(Utc::now());
        drop(metrics);

        debug!("Recorded learning cycle {}", record.id);
        let mut recent = self.recent.write().await;
        recent.push(record);
        if recent.len() > self.max_recent {
            let excess = recent.len() - self.max_recent;
            recent.drain(..excess);
        }
    }

    pub async fn snapshot(&self) -> LearningMetrics {
        self.metrics.read().await.clone()
    }

    /// Most recent cycles, newest last
    pub async fn recent(&self, limit: usize) -> Vec<CycleRecord> {
        let recent = self.recent.read().await;
        let start = recent.len().saturating_sub(limit);
        recent[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_aggregates() {
        let recorder = MetricsRecorder::new();

        let mut first = CycleRecord::new(Outcome::Failure);
        first.operations_proposed = 2;
        first.operations_applied = 2;
        first.dedup_merges = 1;
        first.persisted = Some(true);
        recorder.record(first).await;

        let mut second = CycleRecord::new(Outcome::Success);
        second.degraded_reflection = true;
        second.persisted = Some(false);
        recorder.record(second).await;

        let metrics = recorder.snapshot().await;
        assert_eq!(metrics.cycles, 2);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.successes, 1);
        assert_eq!(metrics.operations_applied, 2);
        assert_eq!(metrics.dedup_merges, 1);
        assert_eq!(metrics.empty_deltas, 1);
        assert_eq!(metrics.persistence_failures, 1);
        assert_eq!(metrics.degradation_rate(), 0.5);
        assert!(metrics.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_recent_is_bounded() {
        let recorder = MetricsRecorder {
            max_recent: 3,
            ..MetricsRecorder::new()
        };
        for _ in 0..5 {
            recorder.record(CycleRecord::new(Outcome::Partial)).await;
        }
        assert_eq!(recorder.recent(10).await.len(), 3);
        assert_eq!(recorder.recent(1).await.len(), 1);
        assert_eq!(recorder.snapshot().await.partials, 5);
    }
}
