//! Reflect -> curate -> apply cycles against scripted backends

mod common;

use common::{curator, reflector, ScriptedBackend};

use ace_playbook::learning::extract_citations;
use ace_playbook::{AgentOutput, ApplyPolicy, BackendError, DeltaBatch, DeltaOperation, LearningLoop, Outcome, Playbook, PlaybookStore, TaskOutcome};
use tempfile::TempDir;

const NULL_CHECK_REFLECTION: &str = r#"```json
{
  "reasoning": "The agent dereferenced a value that was null",
  "error_identification": "No null check on the profile lookup",
  "root_cause": "Assumed the lookup always succeeds",
  "correct_approach": "Guard the lookup result",
  "key_insight": "Check for null before dereferencing",
  "outcome": "failure",
  "confidence": 0.9
}
```"#;

const NULL_CHECK_DELTA: &str = r#"{
  "reasoning": "New validation lesson",
  "operations": [
    {"type": "ADD", "section": "validation", "content": "Check for null before dereferencing"}
  ]
}"#;

fn failing_task() -> TaskOutcome {
    TaskOutcome::new(
        "Open the user's profile page",
        AgentOutput::external("NullPointerException", Some(false)),
        "Missing null check caused crash",
    )
}

fn bullet_lines(rendered: &str) -> Vec<&str> {
    rendered
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with("## "))
        .collect()
}

#[tokio::test]
async fn failing_task_teaches_one_bullet() {
    let reflect_backend = ScriptedBackend::new([NULL_CHECK_REFLECTION]);
    let curate_backend = ScriptedBackend::new([NULL_CHECK_DELTA]);
    let learning = LearningLoop::new(Playbook::new(), reflector(&reflect_backend), curator(&curate_backend));

    let report = learning.learn(&failing_task()).await.unwrap();

    assert_eq!(report.reflection.outcome, Outcome::Failure);
    assert!(!report.reflection.degraded);
    assert_eq!(report.apply.added, vec!["validation-00001"]);
    assert!(!report.saved);

    let rendered = learning.render(None).await;
    assert_eq!(
        bullet_lines(&rendered),
        vec!["[validation-00001] Check for null before dereferencing (helpful: 0, harmful: 0)"]
    );
    assert_eq!(
        rendered,
        "## validation\n[validation-00001] Check for null before dereferencing (helpful: 0, harmful: 0)"
    );

    // Feedback reaches the reflector, the reflection reaches the curator
    assert!(reflect_backend.prompts()[0].contains("Missing null check caused crash"));
    assert!(curate_backend.prompts()[0].contains("Check for null before dereferencing"));
}

#[tokio::test]
async fn repeated_lesson_becomes_tag() {
    let curate_backend = ScriptedBackend::new([
        NULL_CHECK_DELTA,
        r#"{"operations": [{"type": "ADD", "section": "validation", "content": "Always check for null before dereferencing"}]}"#,
    ]);
    let reflect_backend = ScriptedBackend::new([NULL_CHECK_REFLECTION]);
    let learning = LearningLoop::new(Playbook::new(), reflector(&reflect_backend), curator(&curate_backend));

    learning.learn(&failing_task()).await.unwrap();
    let second = learning.learn(&failing_task()).await.unwrap();

    assert_eq!(second.delta.operations, vec![DeltaOperation::tag("validation-00001", 1, 0)]);
    assert_eq!(second.merged, 1);
    assert!(second.apply.added.is_empty());

    let playbook = learning.snapshot().await;
    assert_eq!(playbook.len(), 1);
    assert_eq!(playbook.get("validation-00001").unwrap().helpful(), 1);
}

#[tokio::test]
async fn cited_bullets_are_tagged_from_reflection() {
    let mut seeded = Playbook::new();
    seeded
        .apply(
            &DeltaBatch::new().with(DeltaOperation::add("nav", "Scroll the element into view before clicking")),
            ApplyPolicy::Strict,
        )
        .unwrap();

    let reflect_backend = ScriptedBackend::new([r#"{
        "reasoning": "Scrolling first worked; [nav-00001] applied",
        "outcome": "success",
        "bullet_tags": [{"id": "nav-00001", "tag": "helpful"}, {"id": "nav-00099", "tag": "harmful"}]
    }"#]);
    let curate_backend = ScriptedBackend::new([r#"{"operations": []}"#]);
    let learning = LearningLoop::new(seeded, reflector(&reflect_backend), curator(&curate_backend));

    let output = AgentOutput::external("clicked", Some(true)).with_bullet_ids(vec!["nav-00001".to_string()]);
    let report = learning
        .learn(&TaskOutcome::new("Click submit", output, "Worked"))
        .await
        .unwrap();

    // Unknown citations are dropped silently
    assert_eq!(report.reflection.cited_ids, vec!["nav-00001"]);
    assert_eq!(report.delta.operations, vec![DeltaOperation::tag("nav-00001", 1, 0)]);
    assert_eq!(learning.snapshot().await.get("nav-00001").unwrap().helpful(), 1);
}

#[tokio::test]
async fn backend_outage_degrades_to_noop() {
    let dir = TempDir::new().unwrap();
    let store = PlaybookStore::new(dir.path().join("playbook.json"));
    let reflect_backend = ScriptedBackend::failing(BackendError::Timeout);
    let curate_backend = ScriptedBackend::failing(BackendError::Timeout);
    let learning = LearningLoop::open(store.clone(), reflector(&reflect_backend), curator(&curate_backend)).unwrap();

    let report = learning.learn(&failing_task()).await.unwrap();

    assert!(report.reflection.degraded);
    assert_eq!(report.reflection.reasoning, "Missing null check caused crash");
    assert_eq!(report.reflection.outcome, Outcome::Failure);
    assert!(report.delta.is_empty());
    assert!(!report.apply.changed());
    assert!(!report.saved);
    assert!(!store.exists());

    let metrics = learning.metrics().await;
    assert_eq!(metrics.cycles, 1);
    assert_eq!(metrics.degraded_reflections, 1);
    assert_eq!(metrics.empty_deltas, 1);
}

#[tokio::test]
async fn malformed_curator_output_yields_empty_delta() {
    let reflect_backend = ScriptedBackend::new([NULL_CHECK_REFLECTION]);
    let curate_backend = ScriptedBackend::new(["I think you should add a bullet about null checks."]);
    let learning = LearningLoop::new(Playbook::new(), reflector(&reflect_backend), curator(&curate_backend));

    let report = learning.learn(&failing_task()).await.unwrap();

    assert!(report.delta.is_empty());
    assert!(learning.snapshot().await.is_empty());
    // One retry after the parse failure
    assert_eq!(curate_backend.prompts().len(), 2);
    assert_eq!(learning.metrics().await.degraded_curations, 1);
}

#[test]
fn citations_in_order_of_first_appearance() {
    assert_eq!(
        extract_citations("Applied [nav-00001] and [nav-00002] successfully"),
        vec!["nav-00001", "nav-00002"]
    );
    assert_eq!(
        extract_citations("[nav-00002] then [nav-00001], again [nav-00002]; not [nav-] or [-00001]"),
        vec!["nav-00002", "nav-00001"]
    );
}
