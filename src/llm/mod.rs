//! Completion backend - the one external capability the learning roles need
//!
//! Everything coming back from a backend is untrusted text. Parsing lives in
//! [`response`]; transport lives in [`openrouter`].

pub mod credentials;
pub mod openrouter;
pub mod response;

use async_trait::async_trait;
use thiserror::Error;

pub use openrouter::{OpenRouterClient, ProviderConfig};
pub use response::{extract_json, ParseFailure};

/// Faults raised by a completion backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("completion request timed out")]
    Timeout,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider quota exhausted")]
    QuotaExceeded,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("provider error ({status}): {body}")]
    Provider { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Map an HTTP failure onto a variant
    pub fn classify(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();

        if status == 429 || lower.contains("rate limit") || lower.contains("too many requests") {
            BackendError::RateLimited
        } else if status == 402 || lower.contains("quota") || lower.contains("insufficient credits") {
            BackendError::QuotaExceeded
        } else if status == 401 || status == 403 || lower.contains("invalid api key") || lower.contains("unauthorized") {
            BackendError::Auth(crate::truncate_safe(body, 200))
        } else if status == 408 || status == 504 {
            BackendError::Timeout
        } else {
            BackendError::Provider {
                status,
                body: crate::truncate_safe(body, 500),
            }
        }
    }

    /// Worth one more attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Timeout | BackendError::RateLimited | BackendError::Transport(_) => true,
            BackendError::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A text-completion capability: prompt in, text out
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError>;

    /// Model identifier, for logs
    fn model(&self) -> &str {
        "unknown"
    }
}
