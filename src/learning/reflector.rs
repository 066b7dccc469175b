//! Reflector - diagnose one task outcome against the playbook

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

use super::citation::{extract_citations, merge_citations};
use super::complete_structured;
use super::prompts::{reflection_prompt, ReflectionPromptInput};
use crate::config::RoleConfig;
use crate::llm::response::{extract_object, opt_str, opt_unit, req_str, str_list};
use crate::llm::{CompletionBackend, ParseFailure};
use crate::playbook::Playbook;
use crate::types::{AgentOutput, Outcome};

/// Verdict on a single cited bullet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Helpful,
    Harmful,
    Neutral,
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagKind::Helpful => write!(f, "helpful"),
            TagKind::Harmful => write!(f, "harmful"),
            TagKind::Neutral => write!(f, "neutral"),
        }
    }
}

impl TagKind {
    fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "helpful" | "positive" | "good" => TagKind::Helpful,
            "harmful" | "negative" | "bad" => TagKind::Harmful,
            _ => TagKind::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletTag {
    pub id: String,
    pub tag: TagKind,
}

/// Structured diagnosis of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    /// Diagnosis text
    pub reasoning: String,
    #[serde(default)]
    pub error_identification: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub correct_approach: String,
    /// The reusable lesson
    #[serde(default)]
    pub key_insight: String,
    pub outcome: Outcome,
    /// In [0, 1]
    pub confidence: f64,
    /// Existing bullet ids that influenced the outcome
    pub cited_ids: Vec<String>,
    #[serde(default)]
    pub bullet_tags: Vec<BulletTag>,
    /// Set when the backend could not produce a usable reflection
    #[serde(default)]
    pub degraded: bool,
}

impl Reflection {
    /// Minimal reflection when the backend gave us nothing usable
    pub fn fallback(output: &AgentOutput, feedback: &str) -> Self {
        Self {
            reasoning: feedback.to_string(),
            error_identification: String::new(),
            root_cause: String::new(),
            correct_approach: String::new(),
            key_insight: String::new(),
            outcome: Outcome::from_flag(output.success_flag()),
            confidence: 0.0,
            cited_ids: Vec::new(),
            bullet_tags: Vec::new(),
            degraded: true,
        }
    }

    /// Human-readable block embedded in the curation prompt
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Outcome: {} (confidence {:.2})", self.outcome, self.confidence);
        for (label, text) in [
            ("Analysis", &self.reasoning),
            ("Error", &self.error_identification),
            ("Root cause", &self.root_cause),
            ("Correct approach", &self.correct_approach),
            ("Key insight", &self.key_insight),
        ] {
            if !text.trim().is_empty() {
                let _ = writeln!(out, "{}: {}", label, text.trim());
            }
        }
        if !self.bullet_tags.is_empty() {
            let tags: Vec<String> = self
                .bullet_tags
                .iter()
                .map(|t| format!("{}={}", t.id, t.tag))
                .collect();
            let _ = writeln!(out, "Bullet tags: {}", tags.join(", "));
        }
        out.trim_end().to_string()
    }
}

/// Reflection exactly as the backend described it, before reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReflection {
    pub reasoning: String,
    pub error_identification: String,
    pub root_cause: String,
    pub correct_approach: String,
    pub key_insight: String,
    pub outcome: Option<Outcome>,
    pub confidence: Option<f64>,
    pub cited_ids: Vec<String>,
    pub bullet_tags: Vec<BulletTag>,
}

pub fn parse_reflection(text: &str) -> Result<ParsedReflection, ParseFailure> {
    let obj = extract_object(text)?;

    let outcome = match opt_str(&obj, "outcome")? {
        Some(s) => Some(Outcome::parse(&s).ok_or_else(|| ParseFailure::invalid("outcome", format!("unknown outcome '{}'", s)))?),
        None => None,
    };

    Ok(ParsedReflection {
        reasoning: req_str(&obj, "reasoning")?,
        error_identification: opt_str(&obj, "error_identification")?.unwrap_or_default(),
        root_cause: match opt_str(&obj, "root_cause_analysis")? {
            Some(s) => s,
            None => opt_str(&obj, "root_cause")?.unwrap_or_default(),
        },
        correct_approach: opt_str(&obj, "correct_approach")?.unwrap_or_default(),
        key_insight: opt_str(&obj, "key_insight")?.unwrap_or_default(),
        outcome,
        confidence: opt_unit(&obj, "confidence")?,
        cited_ids: str_list(&obj, "cited_bullet_ids")?,
        bullet_tags: parse_tags(&obj)?,
    })
}

fn parse_tags(obj: &Map<String, Value>) -> Result<Vec<BulletTag>, ParseFailure> {
    let items = match obj.get("bullet_tags") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ParseFailure::invalid("bullet_tags", "expected a list")),
    };
    items
        .iter()
        .map(|item| {
            let entry = item
                .as_object()
                .ok_or_else(|| ParseFailure::invalid("bullet_tags", "expected objects"))?;
            let id = match opt_str(entry, "id")? {
                Some(id) => id,
                None => req_str(entry, "bullet_id")?,
            };
            let tag = opt_str(entry, "tag")?.map(|t| TagKind::parse(&t)).unwrap_or(TagKind::Neutral);
            Ok(BulletTag { id: id.trim().to_string(), tag })
        })
        .collect()
}

/// Produces a [`Reflection`] per task outcome
#[derive(Clone)]
pub struct Reflector {
    backend: Arc<dyn CompletionBackend>,
    config: RoleConfig,
}

impl Reflector {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: RoleConfig) -> Self {
        Self { backend, config }
    }

    /// Analyse a task outcome. Never fails; see [`Reflection::degraded`].
    pub async fn reflect(
        &self,
        question: &str,
        output: &AgentOutput,
        playbook: &Playbook,
        ground_truth: Option<&str>,
        feedback: &str,
    ) -> Reflection {
        let rendered = playbook.render(None);
        let prompt = reflection_prompt(&ReflectionPromptInput {
            question,
            reasoning: &output.reasoning,
            final_answer: &output.final_answer,
            cited_ids: &output.bullet_ids,
            feedback,
            ground_truth,
            playbook: &rendered,
        });

        let parsed = complete_structured(
            self.backend.as_ref(),
            "reflector",
            &prompt,
            self.config.max_tokens,
            self.config.max_retries,
            parse_reflection,
        )
        .await;

        match parsed {
            Ok(parsed) => reconcile(parsed, output, playbook),
            Err(e) => {
                warn!("Reflection degraded to fallback: {}", e);
                Reflection::fallback(output, feedback)
            }
        }
    }
}

/// Merge citations from every source and drop ids the playbook does not have
fn reconcile(parsed: ParsedReflection, output: &AgentOutput, playbook: &Playbook) -> Reflection {
    let scanned = extract_citations(&output.reasoning);
    let all = merge_citations([output.bullet_ids.as_slice(), scanned.as_slice(), parsed.cited_ids.as_slice()]);
    let (cited_ids, unknown): (Vec<String>, Vec<String>) = all.into_iter().partition(|id| playbook.contains(id));
    if !unknown.is_empty() {
        debug!("Dropped unknown citations: {}", unknown.join(", "));
    }

    let bullet_tags = parsed
        .bullet_tags
        .into_iter()
        .filter(|t| playbook.contains(&t.id))
        .collect();

    Reflection {
        reasoning: parsed.reasoning,
        error_identification: parsed.error_identification,
        root_cause: parsed.root_cause,
        correct_approach: parsed.correct_approach,
        key_insight: parsed.key_insight,
        outcome: parsed.outcome.unwrap_or_else(|| Outcome::from_flag(output.success_flag())),
        confidence: parsed.confidence.unwrap_or(0.5),
        cited_ids,
        bullet_tags,
        degraded: false,
    }
}
