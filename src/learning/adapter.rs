//! Learning loop and adaptation drivers
//!
//! [`LearningLoop`] owns the playbook for one process and runs
//! reflect -> curate -> apply -> save as one critical section. Reads
//! (`render`, `context`) take a snapshot and never see a half-applied delta.
//! [`OnlineAdapter`] drives the built-in generator over samples.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use super::curator::Curator;
use super::generator::Generator;
use super::reflector::{Reflection, Reflector};
use crate::delta::{ApplyPolicy, ApplyReport, DeltaBatch, DeltaEngine};
use crate::error::PlaybookError;
use crate::metrics::{CycleRecord, LearningMetrics, MetricsRecorder};
use crate::playbook::{wrap_for_external_agent, Playbook, PlaybookStore, RenderFilter};
use crate::types::AgentOutput;

/// Everything the loop needs to learn from one finished task
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    pub question: String,
    pub output: AgentOutput,
    /// Caller-written summary of what happened
    pub feedback: String,
    pub ground_truth: Option<String>,
    /// Task description handed to the curator
    pub context: String,
    /// e.g. "sample 3/10"
    pub progress: String,
}

impl TaskOutcome {
    pub fn new(question: impl Into<String>, output: AgentOutput, feedback: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            output,
            feedback: feedback.into(),
            ..Default::default()
        }
    }

    pub fn with_ground_truth(mut self, ground_truth: impl Into<String>) -> Self {
        self.ground_truth = Some(ground_truth.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_progress(mut self, progress: impl Into<String>) -> Self {
        self.progress = progress.into();
        self
    }
}

/// Result of one learning cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub reflection: Reflection,
    pub delta: DeltaBatch,
    pub apply: ApplyReport,
    /// Near-duplicate proposals that became TAGs
    pub merged: usize,
    pub saved: bool,
}

/// Owns a playbook and serializes learning cycles against it
pub struct LearningLoop {
    playbook: RwLock<Playbook>,
    /// Held for a whole cycle; guards the revision last seen on disk
    cycle: Mutex<u64>,
    reflector: Reflector,
    curator: Curator,
    policy: ApplyPolicy,
    store: Option<PlaybookStore>,
    autosave: bool,
    metrics: MetricsRecorder,
}

impl LearningLoop {
    /// In-memory loop; nothing is persisted
    pub fn new(playbook: Playbook, reflector: Reflector, curator: Curator) -> Self {
        Self {
            playbook: RwLock::new(playbook),
            cycle: Mutex::new(0),
            reflector,
            curator,
            policy: ApplyPolicy::default(),
            store: None,
            autosave: false,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Load the playbook from `store` and save back to it after each cycle
    pub fn open(store: PlaybookStore, reflector: Reflector, curator: Curator) -> Result<Self, PlaybookError> {
        let playbook = store.load()?;
        let base = playbook.revision();
        let mut learning = Self::new(playbook, reflector, curator);
        learning.cycle = Mutex::new(base);
        learning.store = Some(store);
        learning.autosave = true;
        Ok(learning)
    }

    pub fn with_policy(mut self, policy: ApplyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn policy(&self) -> ApplyPolicy {
        self.policy
    }

    /// Consistent copy of the current playbook
    pub async fn snapshot(&self) -> Playbook {
        self.playbook.read().await.clone()
    }

    pub async fn render(&self, filter: Option<&RenderFilter>) -> String {
        self.playbook.read().await.render(filter)
    }

    /// Context block for an external agent's prompt
    pub async fn context(&self) -> String {
        wrap_for_external_agent(&*self.playbook.read().await)
    }

    pub async fn metrics(&self) -> LearningMetrics {
        self.metrics.snapshot().await
    }

    pub fn recorder(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Run one reflect -> curate -> apply -> save cycle.
    ///
    /// Backend and parse faults degrade to a no-op cycle. Errors are strict
    /// validation rejections and persistence faults only.
    pub async fn learn(&self, task: &TaskOutcome) -> Result<CycleReport, PlaybookError> {
        let mut base_revision = self.cycle.lock().await;
        let snapshot = self.snapshot().await;

        let reflection = self
            .reflector
            .reflect(
                &task.question,
                &task.output,
                &snapshot,
                task.ground_truth.as_deref(),
                &task.feedback,
            )
            .await;
        let curation = self
            .curator
            .curate_with_report(&reflection, &snapshot, &task.context, &task.progress)
            .await;

        let mut record = CycleRecord::new(reflection.outcome);
        record.degraded_reflection = reflection.degraded;
        record.degraded_curation = curation.degraded;
        record.operations_proposed = curation.delta.len();
        record.dedup_merges = curation.merged.len();
        record.atomicity_rejections = curation.low_atomicity.len();

        let applied = {
            let mut playbook = self.playbook.write().await;
            DeltaEngine::new(self.policy)
                .apply(&mut playbook, &curation.delta)
                .map(|report| (report, playbook.clone()))
        };

        let (apply, updated) = match applied {
            Ok(result) => result,
            Err(e) => {
                warn!("Learning cycle rejected: {}", e);
                record.validation_failed = true;
                record.operations_rejected = e.rejections().len();
                record.finish();
                self.metrics.record(record).await;
                return Err(e);
            }
        };
        record.operations_applied = apply.applied;
        record.operations_rejected = apply.rejected.len();

        let mut saved = false;
        if apply.changed() && self.autosave {
            if let Some(store) = &self.store {
                match store.save_checked(&updated, *base_revision) {
                    Ok(()) => {
                        *base_revision = updated.revision();
                        saved = true;
                        record.persisted = Some(true);
                    }
                    Err(e) => {
                        error!("Failed to persist playbook: {}", e);
                        record.persisted = Some(false);
                        record.finish();
                        self.metrics.record(record).await;
                        return Err(e);
                    }
                }
            }
        }

        info!(
            "Learning cycle done: {} outcome, {} ({} bullets)",
            reflection.outcome,
            apply,
            updated.len()
        );
        record.finish();
        self.metrics.record(record).await;

        Ok(CycleReport {
            reflection,
            delta: curation.delta,
            merged: curation.merged.len(),
            apply,
            saved,
        })
    }

    /// Apply a hand-built delta under the loop's policy (no autosave)
    pub async fn apply(&self, delta: &DeltaBatch) -> Result<ApplyReport, PlaybookError> {
        let _guard = self.cycle.lock().await;
        let mut playbook = self.playbook.write().await;
        DeltaEngine::new(self.policy).apply(&mut playbook, delta)
    }

    /// Save now, failing if another session saved since we last did
    pub async fn save(&self) -> Result<(), PlaybookError> {
        let mut base_revision = self.cycle.lock().await;
        let Some(store) = &self.store else {
            return Ok(());
        };
        let snapshot = self.snapshot().await;
        store.save_checked(&snapshot, *base_revision)?;
        *base_revision = snapshot.revision();
        Ok(())
    }

    /// Drop in-memory state and load what is on disk
    pub async fn reload(&self) -> Result<(), PlaybookError> {
        let mut base_revision = self.cycle.lock().await;
        let Some(store) = &self.store else {
            return Ok(());
        };
        let loaded = store.load()?;
        *base_revision = loaded.revision();
        *self.playbook.write().await = loaded;
        Ok(())
    }
}

/// One training or evaluation item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sample {
    pub question: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub ground_truth: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl Sample {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_ground_truth(mut self, ground_truth: impl Into<String>) -> Self {
        self.ground_truth = Some(ground_truth.into());
        self
    }
}

/// Environment verdict on one generated answer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentResult {
    pub feedback: String,
    #[serde(default)]
    pub ground_truth: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

/// Scores agent output for a sample
#[async_trait]
pub trait TaskEnvironment: Send + Sync {
    async fn evaluate(&self, sample: &Sample, output: &AgentOutput) -> EnvironmentResult;
}

/// What happened to one sample
#[derive(Debug, Clone)]
pub struct AdapterStep {
    pub epoch: usize,
    pub index: usize,
    pub sample: Sample,
    pub output: Option<AgentOutput>,
    pub environment: Option<EnvironmentResult>,
    pub cycle: Option<CycleReport>,
    /// Generation or validation problem that skipped part of the step
    pub error: Option<String>,
}

/// Generate -> evaluate -> learn, one sample at a time
pub struct OnlineAdapter {
    generator: Generator,
    learning: Arc<LearningLoop>,
}

impl OnlineAdapter {
    pub fn new(generator: Generator, learning: Arc<LearningLoop>) -> Self {
        Self { generator, learning }
    }

    pub fn learning(&self) -> &Arc<LearningLoop> {
        &self.learning
    }

    /// Process one sample. Persistence faults abort; everything else is
    /// recorded on the step.
    pub async fn step(
        &self,
        sample: &Sample,
        environment: &dyn TaskEnvironment,
        epoch: usize,
        index: usize,
        progress: &str,
    ) -> Result<AdapterStep, PlaybookError> {
        let mut step = AdapterStep {
            epoch,
            index,
            sample: sample.clone(),
            output: None,
            environment: None,
            cycle: None,
            error: None,
        };

        let playbook = self.learning.snapshot().await;
        let mut output = match self.generator.generate(&sample.question, &sample.context, &playbook).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Generation failed for sample {}: {}", index, e);
                step.error = Some(e.to_string());
                return Ok(step);
            }
        };

        let verdict = environment.evaluate(sample, &output).await;
        if let (Some(flag), Some(raw)) = (verdict.success, output.raw.as_object_mut()) {
            raw.insert("success".to_string(), Value::Bool(flag));
        }

        let mut task = TaskOutcome::new(&sample.question, output.clone(), &verdict.feedback)
            .with_context(&sample.context)
            .with_progress(progress);
        task.ground_truth = verdict.ground_truth.clone().or_else(|| sample.ground_truth.clone());

        match self.learning.learn(&task).await {
            Ok(cycle) => step.cycle = Some(cycle),
            Err(e) if e.is_recoverable() => step.error = Some(e.to_string()),
            Err(e) => return Err(e),
        }

        step.output = Some(output);
        step.environment = Some(verdict);
        Ok(step)
    }

    /// One pass over `samples`
    pub async fn run(&self, samples: &[Sample], environment: &dyn TaskEnvironment) -> Result<Vec<AdapterStep>, PlaybookError> {
        self.run_epochs(samples, environment, 1).await
    }

    /// Several passes over the same samples, learning after every one
    pub async fn run_epochs(
        &self,
        samples: &[Sample],
        environment: &dyn TaskEnvironment,
        epochs: usize,
    ) -> Result<Vec<AdapterStep>, PlaybookError> {
        let mut steps = Vec::with_capacity(samples.len() * epochs);
        for epoch in 1..=epochs {
            for (index, sample) in samples.iter().enumerate() {
                let progress = format!("epoch {}/{}, sample {}/{}", epoch, epochs, index + 1, samples.len());
                steps.push(self.step(sample, environment, epoch, index, &progress).await?);
            }
            info!("Epoch {}/{} complete", epoch, epochs);
        }
        Ok(steps)
    }
}
