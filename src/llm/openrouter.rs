//! OpenRouter chat-completions client (any OpenAI-compatible provider works)

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{BackendError, CompletionBackend};
use crate::config::ProviderSettings;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Connection settings for an API provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for the API (e.g., "https://openrouter.ai/api/v1")
    pub base_url: String,
    pub api_key: String,
    /// Extra headers sent with every request
    pub extra_headers: Vec<(String, String)>,
    /// Send `transforms: []` (OpenRouter-specific)
    pub include_transforms: bool,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn openrouter(api_key: String) -> Self {
        Self {
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key,
            extra_headers: vec![("X-Title".to_string(), "ACE Playbook".to_string())],
            include_transforms: true,
            timeout: Duration::from_secs(60),
        }
    }

    /// Generic OpenAI-compatible provider at a custom URL
    pub fn compatible(api_key: String, base_url: String) -> Self {
        Self {
            base_url,
            api_key,
            extra_headers: Vec::new(),
            include_transforms: false,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_settings(settings: &ProviderSettings, api_key: String) -> Self {
        let base = settings.base_url.trim_end_matches('/').to_string();
        let mut config = if base == OPENROUTER_BASE_URL {
            Self::openrouter(api_key)
        } else {
            Self::compatible(api_key, base)
        };
        config.timeout = Duration::from_secs(settings.timeout_secs);
        config
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    transforms: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Single-model completion client
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Arc<Client>,
    provider: ProviderConfig,
    model: String,
}

impl OpenRouterClient {
    pub fn new(provider: ProviderConfig, model: impl Into<String>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(provider.timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            provider,
            model: model.into(),
        })
    }

    /// Same connection, different model
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            client: Arc::clone(&self.client),
            provider: self.provider.clone(),
            model: model.into(),
        }
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            transforms: if self.provider.include_transforms { Some(vec![]) } else { None },
        };

        let mut req_builder = self
            .client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key));
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }

        let response = req_builder.json(&request).send().await.map_err(map_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport)?;
        if !status.is_success() {
            return Err(BackendError::classify(status.as_u16(), &body));
        }

        debug!("{} responded with {} bytes", self.model, body.len());
        let raw: Value = serde_json::from_str(&body).map_err(|e| {
            BackendError::Malformed(format!("{} (body: {})", e, crate::truncate_safe(&body, 300)))
        })?;
        extract_content(&raw)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn map_transport(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(err.to_string())
    }
}

/// Message content from a chat-completions payload.
///
/// Handles both plain string content and arrays of `{type: "text"}` parts.
/// Some providers report errors inside a 200 response.
fn extract_content(raw: &Value) -> Result<String, BackendError> {
    if let Some(err) = raw.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown provider error");
        let code = err
            .get("code")
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(500);
        return Err(BackendError::classify(code, message));
    }

    let content_value = raw
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"));

    match content_value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Array(parts)) => Ok(parts
            .iter()
            .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("")),
        _ => Err(BackendError::Malformed("response has no message content".to_string())),
    }
}
