//! Curator - turn a reflection into a delta
//!
//! Backend proposals are filtered before they become a delta: ADDs are
//! scored for atomicity and checked for near-duplicates, and everything is
//! pre-validated against the playbook. The result only holds operations that
//! will apply cleanly.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::atomicity::combined_score;
use super::complete_structured;
use super::prompts::{curation_prompt, CurationPromptInput};
use super::reflector::{Reflection, TagKind};
use super::similarity::{find_most_similar, similarity};
use crate::config::CuratorConfig;
use crate::delta::{parse_delta, ApplyPolicy, DeltaBatch, DeltaEngine, DeltaOperation, RejectedOperation};
use crate::llm::{CompletionBackend, ParseFailure};
use crate::playbook::{normalize_section_name, Playbook};

/// What happened to the backend's proposals
#[derive(Debug, Clone, Default)]
pub struct CurationReport {
    pub delta: DeltaBatch,
    /// Near-duplicate ADDs turned into TAGs: (proposed content, existing id)
    pub merged: Vec<(String, String)>,
    /// ADDs dropped for low atomicity: (content, score)
    pub low_atomicity: Vec<(String, f64)>,
    /// ADDs dropped for repeating an earlier ADD in the same response
    pub duplicates: usize,
    /// Records that did not parse
    pub unparsed: Vec<(usize, ParseFailure)>,
    /// Operations that would not validate against the playbook
    pub invalid: Vec<RejectedOperation>,
    /// Backend output was unusable; the delta is empty
    pub degraded: bool,
}

/// Produces a [`DeltaBatch`] from a [`Reflection`]
#[derive(Clone)]
pub struct Curator {
    backend: Arc<dyn CompletionBackend>,
    config: CuratorConfig,
}

impl Curator {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: CuratorConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    /// Propose the next delta. Never fails; an empty delta is a valid result.
    pub async fn curate(&self, reflection: &Reflection, playbook: &Playbook, question_context: &str, progress: &str) -> DeltaBatch {
        self.curate_with_report(reflection, playbook, question_context, progress)
            .await
            .delta
    }

    pub async fn curate_with_report(
        &self,
        reflection: &Reflection,
        playbook: &Playbook,
        question_context: &str,
        progress: &str,
    ) -> CurationReport {
        let mut report = CurationReport::default();
        let mut proposed = DeltaBatch::new();

        if self.config.apply_reflection_tags {
            for tag in &reflection.bullet_tags {
                match tag.tag {
                    TagKind::Helpful => proposed.push(DeltaOperation::tag(&tag.id, 1, 0)),
                    TagKind::Harmful => proposed.push(DeltaOperation::tag(&tag.id, 0, 1)),
                    TagKind::Neutral => {}
                }
            }
        }

        let rendered = playbook.render(None);
        let summary = reflection.summary();
        let prompt = curation_prompt(&CurationPromptInput {
            reflection: &summary,
            playbook: &rendered,
            question_context,
            progress,
        });

        let parsed = complete_structured(
            self.backend.as_ref(),
            "curator",
            &prompt,
            self.config.role.max_tokens,
            self.config.role.max_retries,
            parse_delta,
        )
        .await;

        match parsed {
            Ok(parsed) => {
                proposed.reasoning = parsed.reasoning;
                for (index, failure) in &parsed.invalid {
                    warn!("Curator operation #{} unparseable: {}", index, failure);
                }
                report.unparsed = parsed.invalid;

                let mut added: Vec<(String, String)> = Vec::new();
                for candidate in parsed.candidates {
                    match candidate.operation {
                        DeltaOperation::Add { section, content, tags } => {
                            // Reuse an existing section that differs only in case or spacing
                            let section = match playbook.find_section(&section) {
                                Some(existing) => existing.name().to_string(),
                                None => normalize_section_name(&section),
                            };
                            let content = content.trim().to_string();

                            let score = combined_score(&content, candidate.atomicity_hint);
                            if score < self.config.min_atomicity {
                                warn!("Dropping non-atomic candidate ({:.2}): {}", score, crate::truncate_safe(&content, 80));
                                report.low_atomicity.push((content, score));
                                continue;
                            }

                            let existing = playbook
                                .section(&section)
                                .and_then(|s| find_most_similar(&content, s.bullets(), self.config.similarity_threshold));
                            if let Some((bullet, overlap)) = existing {
                                debug!("Candidate overlaps {} ({:.2}), tagging instead", bullet.id(), overlap);
                                proposed.push(DeltaOperation::tag(bullet.id(), 1, 0));
                                report.merged.push((content, bullet.id().to_string()));
                                continue;
                            }

                            let repeats_earlier = added
                                .iter()
                                .any(|(s, c)| *s == section && similarity(c, &content) >= self.config.similarity_threshold);
                            if repeats_earlier {
                                debug!("Dropping repeated candidate: {}", crate::truncate_safe(&content, 80));
                                report.duplicates += 1;
                                continue;
                            }

                            added.push((section.clone(), content.clone()));
                            proposed.push(DeltaOperation::Add { section, content, tags });
                        }
                        other => proposed.push(other),
                    }
                }
            }
            Err(e) => {
                warn!("Curation produced no delta: {}", e);
                report.degraded = true;
            }
        }

        // Keep only what will apply cleanly
        let (accepted, rejected) = DeltaEngine::new(ApplyPolicy::Lenient).validate(playbook, &proposed);
        for r in &rejected {
            warn!("Curator proposed invalid operation {}", r);
        }
        report.invalid = rejected;

        let mut delta = DeltaBatch::with_reasoning(std::mem::take(&mut proposed.reasoning));
        for index in accepted {
            delta.push(proposed.operations[index].clone());
        }

        info!(
            "Curated {} operations ({} merged, {} non-atomic, {} invalid)",
            delta.len(),
            report.merged.len(),
            report.low_atomicity.len(),
            report.invalid.len()
        );
        report.delta = delta;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::reflector::BulletTag;
    use crate::llm::MockCompletionBackend;
    use crate::types::{AgentOutput, Outcome};

    fn playbook() -> Playbook {
        let mut playbook = Playbook::new();
        playbook
            .apply(
                &DeltaBatch::new()
                    .with(DeltaOperation::add("validation", "Check for null before dereferencing"))
                    .with(DeltaOperation::add("nav", "Scroll the element into view")),
                ApplyPolicy::Strict,
            )
            .unwrap();
        playbook
    }

    fn reflection() -> Reflection {
        let mut r = Reflection::fallback(&AgentOutput::external("crash", Some(false)), "Missing null check caused crash");
        r.degraded = false;
        r.outcome = Outcome::Failure;
        r
    }

    fn curator_returning(reply: &'static str) -> Curator {
        let mut backend = MockCompletionBackend::new();
        backend.expect_complete().returning(move |_, _| Ok(reply.to_string()));
        Curator::new(Arc::new(backend), CuratorConfig::default())
    }

    #[tokio::test]
    async fn test_near_duplicate_becomes_tag() {
        let curator = curator_returning(
            r#"{"reasoning": "r", "operations": [
                {"type": "ADD", "section": "validation", "content": "Always check for null before dereferencing"}
            ]}"#,
        );
        let report = curator.curate_with_report(&reflection(), &playbook(), "", "").await;
        assert_eq!(report.delta.operations, vec![DeltaOperation::tag("validation-00001", 1, 0)]);
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.delta.reasoning, "r");
    }

    #[tokio::test]
    async fn test_filters_candidates() {
        let curator = curator_returning(
            r#"{"operations": [
                {"type": "ADD", "section": "Error Handling", "content": "Log the full stack trace on failure"},
                {"type": "ADD", "section": "error_handling", "content": "Log the full stack trace on every failure"},
                {"type": "ADD", "section": "nav", "content": "Be careful"},
                {"type": "ADD", "section": "nav", "content": "Close modal dialogs before clicking", "atomicity_score": 0.2},
                {"type": "UPDATE", "bullet_id": "nav-00042", "content": "x y z"},
                {"type": "REMOVE", "bullet_id": "nav-00001"},
                {"type": "SPLIT", "bullet_id": "nav-00001"}
            ]}"#,
        );
        let report = curator.curate_with_report(&reflection(), &playbook(), "task", "1/1").await;

        assert_eq!(
            report.delta.operations,
            vec![
                DeltaOperation::add("error_handling", "Log the full stack trace on failure"),
                DeltaOperation::remove("nav-00001"),
            ]
        );
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.low_atomicity.len(), 2);
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.unparsed.len(), 1);
        assert!(!report.degraded);
    }

    #[tokio::test]
    async fn test_duplicate_in_mixed_case_section_becomes_tag() {
        let mut existing = Playbook::new();
        existing
            .apply(
                &DeltaBatch::new().with(DeltaOperation::add("Validation", "Check for null before dereferencing")),
                ApplyPolicy::Strict,
            )
            .unwrap();
        let curator = curator_returning(
            r#"{"operations": [
                {"type": "ADD", "section": "Validation", "content": "Check for null before dereferencing"},
                {"type": "ADD", "section": "validation", "content": "Validate inputs at the API boundary"}
            ]}"#,
        );

        let delta = curator.curate(&reflection(), &existing, "", "").await;
        assert_eq!(
            delta.operations,
            vec![
                DeltaOperation::tag("Validation-00001", 1, 0),
                DeltaOperation::add("Validation", "Validate inputs at the API boundary"),
            ]
        );
    }

    #[tokio::test]
    async fn test_reflection_tags_prepended() {
        let curator = curator_returning(r#"{"operations": []}"#);
        let mut r = reflection();
        r.bullet_tags = vec![
            BulletTag { id: "nav-00001".into(), tag: TagKind::Harmful },
            BulletTag { id: "validation-00001".into(), tag: TagKind::Neutral },
            BulletTag { id: "validation-00001".into(), tag: TagKind::Helpful },
        ];
        let delta = curator.curate(&r, &playbook(), "", "").await;
        assert_eq!(
            delta.operations,
            vec![DeltaOperation::tag("nav-00001", 0, 1), DeltaOperation::tag("validation-00001", 1, 0)]
        );
    }

    #[tokio::test]
    async fn test_malformed_output_yields_empty_delta() {
        let curator = curator_returning("Sorry, I cannot help with that.");
        let report = curator.curate_with_report(&reflection(), &playbook(), "", "").await;
        assert!(report.degraded);
        assert!(report.delta.is_empty());
    }
}
