//! Shared value types passed between the agent side and the learning roles

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How a task turned out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
}

impl Outcome {
    /// true -> success, false -> failure, unknown -> partial
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Outcome::Success,
            Some(false) => Outcome::Failure,
            None => Outcome::Partial,
        }
    }

    /// Lenient parse of model output ("SUCCESS", "failed", "partially correct")
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        if lower.starts_with("success") || lower == "correct" || lower == "pass" || lower == "passed" {
            Some(Outcome::Success)
        } else if lower.starts_with("fail") || lower == "incorrect" || lower == "error" {
            Some(Outcome::Failure)
        } else if lower.starts_with("partial") || lower == "mixed" {
            Some(Outcome::Partial)
        } else {
            None
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
            Outcome::Partial => write!(f, "partial"),
        }
    }
}

/// What the agent produced for one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub final_answer: String,
    /// Ids the agent says it relied on
    #[serde(default)]
    pub bullet_ids: Vec<String>,
    /// Opaque payload: success flag, raw trace, step counts
    #[serde(default)]
    pub raw: Value,
}

impl AgentOutput {
    pub fn new(reasoning: impl Into<String>, final_answer: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            final_answer: final_answer.into(),
            bullet_ids: Vec::new(),
            raw: Value::Null,
        }
    }

    /// Output from an agent that only reports an answer and a success flag
    pub fn external(final_answer: impl Into<String>, success: Option<bool>) -> Self {
        let mut out = Self::new("", final_answer);
        if let Some(flag) = success {
            out.raw = serde_json::json!({ "success": flag });
        }
        out
    }

    pub fn with_bullet_ids(mut self, ids: Vec<String>) -> Self {
        self.bullet_ids = ids;
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// `raw.success`, if the agent reported one
    pub fn success_flag(&self) -> Option<bool> {
        self.raw.get("success").and_then(|v| v.as_bool())
    }
}

const OUTCOME_TEXT_LIMIT: usize = 500;

/// Standard feedback text for a finished external-agent run
pub fn describe_outcome(success: bool, steps: usize, output: Option<&str>, error: Option<&str>) -> String {
    let mut feedback = if success {
        format!("Task completed successfully in {} steps.", steps)
    } else {
        format!("Task failed after {} steps.", steps)
    };
    if let Some(output) = output.filter(|o| !o.trim().is_empty()) {
        feedback.push_str(&format!("\nOutput: {}", crate::truncate_safe(output.trim(), OUTCOME_TEXT_LIMIT)));
    }
    if let Some(error) = error.filter(|e| !e.trim().is_empty()) {
        feedback.push_str(&format!("\nError: {}", crate::truncate_safe(error.trim(), OUTCOME_TEXT_LIMIT)));
    }
    feedback
}
