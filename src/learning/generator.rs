//! Generator - answer a question with the playbook in the prompt

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::citation::{extract_citations, merge_citations};
use super::prompts::generation_prompt;
use super::{complete_structured, GenerationError};
use crate::config::RoleConfig;
use crate::llm::response::{extract_object, opt_str, req_str, str_list};
use crate::llm::{CompletionBackend, ParseFailure};
use crate::playbook::Playbook;
use crate::types::AgentOutput;

fn parse_generation(text: &str) -> Result<AgentOutput, ParseFailure> {
    let obj = extract_object(text)?;
    let final_answer = req_str(&obj, "final_answer")?;
    let reasoning = opt_str(&obj, "reasoning")?.unwrap_or_default();
    let reported = str_list(&obj, "bullet_ids")?;
    let scanned = extract_citations(&reasoning);
    let bullet_ids = merge_citations([reported.as_slice(), scanned.as_slice()]);

    Ok(AgentOutput {
        reasoning,
        final_answer,
        bullet_ids,
        raw: Value::Object(obj),
    })
}

/// Built-in agent that answers with the playbook as context
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn CompletionBackend>,
    config: RoleConfig,
}

impl Generator {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: RoleConfig) -> Self {
        Self { backend, config }
    }

    pub async fn generate(&self, question: &str, context: &str, playbook: &Playbook) -> Result<AgentOutput, GenerationError> {
        let prompt = generation_prompt(question, context, &playbook.render(None));
        let output = complete_structured(
            self.backend.as_ref(),
            "generator",
            &prompt,
            self.config.max_tokens,
            self.config.max_retries,
            parse_generation,
        )
        .await?;
        info!("Generated answer citing {} bullets", output.bullet_ids.len());
        Ok(output)
    }
}
