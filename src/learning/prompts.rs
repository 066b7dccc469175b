//! Prompt templates for the learning roles
//!
//! Each role asks for a single JSON object. The strict variants are used for
//! the one retry after a parse failure.

const NO_STRATEGIES: &str = "(no strategies yet)";

fn playbook_or_placeholder(rendered: &str) -> &str {
    if rendered.trim().is_empty() {
        NO_STRATEGIES
    } else {
        rendered
    }
}

/// Inputs to a reflection prompt
pub struct ReflectionPromptInput<'a> {
    pub question: &'a str,
    pub reasoning: &'a str,
    pub final_answer: &'a str,
    pub cited_ids: &'a [String],
    pub feedback: &'a str,
    pub ground_truth: Option<&'a str>,
    pub playbook: &'a str,
}

pub fn reflection_prompt(input: &ReflectionPromptInput<'_>) -> String {
    let cited = if input.cited_ids.is_empty() {
        "(none)".to_string()
    } else {
        input.cited_ids.join(", ")
    };

    format!(
        r#"You analyze how an agent performed on one task and which playbook strategies mattered.

## Task
{question}

## Agent reasoning
{reasoning}

## Agent final answer
{answer}

## Strategies the agent cited
{cited}

## Feedback
{feedback}

## Ground truth
{ground_truth}

## Current playbook
{playbook}

Diagnose what went right or wrong. Tag a cited strategy "helpful" if it
contributed to the result, "harmful" if it misled the agent, "neutral" otherwise.

Respond with one JSON object and nothing else:
{{
  "reasoning": "step-by-step analysis",
  "error_identification": "what went wrong, or empty",
  "root_cause_analysis": "why it went wrong, or empty",
  "correct_approach": "what should have been done",
  "key_insight": "the single most reusable lesson",
  "outcome": "success" | "failure" | "partial",
  "confidence": 0.0-1.0,
  "cited_bullet_ids": ["section-00001"],
  "bullet_tags": [{{"id": "section-00001", "tag": "helpful" | "harmful" | "neutral"}}]
}}"#,
        question = input.question,
        reasoning = if input.reasoning.is_empty() { "(not provided)" } else { input.reasoning },
        answer = input.final_answer,
        cited = cited,
        feedback = input.feedback,
        ground_truth = input.ground_truth.unwrap_or("(not provided)"),
        playbook = playbook_or_placeholder(input.playbook),
    )
}

/// Inputs to a curation prompt
pub struct CurationPromptInput<'a> {
    pub reflection: &'a str,
    pub playbook: &'a str,
    pub question_context: &'a str,
    pub progress: &'a str,
}

pub fn curation_prompt(input: &CurationPromptInput<'_>) -> String {
    format!(
        r#"You maintain a playbook of short, reusable strategies for an agent.

## Task context
{context}

## Progress
{progress}

## Reflection on the latest attempt
{reflection}

## Current playbook
{playbook}

Propose the smallest set of changes that captures the lesson:
- ADD a new strategy only if nothing in the playbook already says it
- UPDATE a strategy whose wording is wrong or incomplete
- TAG a strategy that proved helpful or harmful
- REMOVE a strategy that is consistently harmful
Each strategy must state exactly one actionable idea in one sentence.
Section names are lowercase words joined by underscores.

Respond with one JSON object and nothing else:
{{
  "reasoning": "why these changes",
  "operations": [
    {{"type": "ADD", "section": "validation", "content": "...", "atomicity_score": 0.0-1.0}},
    {{"type": "UPDATE", "bullet_id": "section-00001", "content": "..."}},
    {{"type": "TAG", "bullet_id": "section-00001", "metadata": {{"helpful": 1, "harmful": 0}}}},
    {{"type": "REMOVE", "bullet_id": "section-00001"}}
  ]
}}
Return an empty "operations" list if nothing should change."#,
        context = if input.question_context.is_empty() { "(not provided)" } else { input.question_context },
        progress = if input.progress.is_empty() { "(not provided)" } else { input.progress },
        reflection = input.reflection,
        playbook = playbook_or_placeholder(input.playbook),
    )
}

pub fn generation_prompt(question: &str, context: &str, playbook: &str) -> String {
    format!(
        r#"You solve tasks using a playbook of learned strategies.

## Playbook
{playbook}

Cite every strategy you rely on by its id in brackets, e.g. [section-00001].

## Question
{question}

## Context
{context}

Respond with one JSON object and nothing else:
{{
  "reasoning": "step-by-step reasoning citing strategy ids",
  "bullet_ids": ["section-00001"],
  "final_answer": "..."
}}"#,
        playbook = playbook_or_placeholder(playbook),
        question = question,
        context = if context.is_empty() { "(none)" } else { context },
    )
}

/// Appended to a prompt for the retry after unparseable output
pub fn strict_suffix(previous_error: &str) -> String {
    format!(
        "\n\nYour previous reply could not be parsed ({}). Reply with ONLY the JSON object: \
         no prose, no markdown fences, every required field present.",
        previous_error
    )
}
