//! Learning loop - reflect on an outcome, curate a delta, apply it
//!
//! The roles talk to a [`CompletionBackend`] and treat its replies as
//! untrusted. Reflector and Curator never fail: they degrade to a minimal
//! reflection or an empty delta. The Generator does fail, since a missing
//! answer is the caller's problem.

pub mod adapter;
pub mod atomicity;
pub mod citation;
pub mod curator;
pub mod generator;
pub mod prompts;
pub mod reflector;
pub mod similarity;

pub use adapter::{CycleReport, EnvironmentResult, LearningLoop, OnlineAdapter, Sample, TaskEnvironment, TaskOutcome};
pub use citation::extract_citations;
pub use curator::{CurationReport, Curator};
pub use generator::Generator;
pub use reflector::{BulletTag, Reflection, Reflector, TagKind};

use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{BackendError, CompletionBackend, ParseFailure};

/// Why a role could not produce structured output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("completion backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error("unparseable completion: {0}")]
    Parse(#[from] ParseFailure),
}

/// Ask the backend and parse the reply, retrying up to `max_retries` times.
///
/// Retries after a parse failure append a stricter instruction to the prompt.
pub(crate) async fn complete_structured<T, F>(
    backend: &dyn CompletionBackend,
    role: &str,
    prompt: &str,
    max_tokens: u32,
    max_retries: u32,
    parse: F,
) -> Result<T, GenerationError>
where
    F: Fn(&str) -> Result<T, ParseFailure>,
{
    let mut last_error = None;
    for attempt in 0..=max_retries {
        let request = match &last_error {
            Some(GenerationError::Parse(failure)) => format!("{}{}", prompt, prompts::strict_suffix(&failure.to_string())),
            _ => prompt.to_string(),
        };

        let error = match backend.complete(&request, max_tokens).await {
            Ok(text) => match parse(&text) {
                Ok(value) => {
                    debug!("{} parsed on attempt {}", role, attempt + 1);
                    return Ok(value);
                }
                Err(failure) => GenerationError::Parse(failure),
            },
            Err(err) => GenerationError::Backend(err),
        };

        warn!("{} attempt {}/{} failed: {}", role, attempt + 1, max_retries + 1, error);
        if let GenerationError::Backend(err) = &error {
            if !err.is_retryable() {
                return Err(error);
            }
        }
        last_error = Some(error);
    }

    Err(last_error.unwrap_or(GenerationError::Parse(ParseFailure::NoJson)))
}
