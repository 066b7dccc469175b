//! ACE Playbook - self-curating strategy memory for LLM agents
//!
//! An agent's experience is condensed into a playbook of small, citable
//! strategy bullets. After each task:
//! - a Reflector diagnoses the outcome and tags the bullets that were used
//! - a Curator proposes a delta of ADD / UPDATE / TAG / REMOVE operations
//! - the delta engine validates and applies it without rewriting the rest
//!
//! # Example
//!
//! ```ignore
//! use ace_playbook::{Config, LearningLoop, PlaybookStore, TaskOutcome};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let learning = LearningLoop::open(PlaybookStore::new("playbook.json"), reflector, curator)?;
//!     let report = learning.learn(&TaskOutcome::new(question, output, feedback)).await?;
//!     println!("{}", report.apply);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod playbook;
pub mod delta;
pub mod llm;
pub mod learning;
pub mod metrics;
pub mod cli;

pub use types::{AgentOutput, Outcome};

pub use error::PlaybookError;

pub use config::Config;

pub use playbook::{Bullet, Playbook, PlaybookStore, RenderFilter, Section};

pub use delta::{ApplyPolicy, ApplyReport, DeltaBatch, DeltaEngine, DeltaOperation};

pub use llm::{BackendError, CompletionBackend, OpenRouterClient, ProviderConfig};

pub use learning::{
    Curator,
    CycleReport,
    Generator,
    LearningLoop,
    OnlineAdapter,
    Reflection,
    Reflector,
    TaskEnvironment,
    TaskOutcome,
};

pub use metrics::{LearningMetrics, MetricsRecorder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Agentic Context Engineering playbook", NAME, VERSION)
}

/// Truncate to at most `max` characters, ending in "..." when cut
pub fn truncate_safe(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
