//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ace_playbook::config::{CuratorConfig, RoleConfig};
use ace_playbook::{BackendError, CompletionBackend, Curator, Reflector};

/// Replays canned replies in order and remembers every prompt it saw
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    replies: Arc<Mutex<VecDeque<Result<String, BackendError>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect())),
            prompts: Arc::default(),
        }
    }

    pub fn failing(error: BackendError) -> Self {
        let backend = Self::default();
        backend.replies.lock().unwrap().push_back(Err(error));
        backend
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut replies = self.replies.lock().unwrap();
        match replies.len() {
            0 => Err(BackendError::Transport("script exhausted".into())),
            // The last reply repeats so retries see the same answer
            1 => replies.front().cloned().unwrap_or_else(|| Err(BackendError::Transport("empty".into()))),
            _ => replies.pop_front().unwrap_or_else(|| Err(BackendError::Transport("empty".into()))),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

pub fn reflector(backend: &ScriptedBackend) -> Reflector {
    Reflector::new(Arc::new(backend.clone()), RoleConfig::default())
}

pub fn curator(backend: &ScriptedBackend) -> Curator {
    Curator::new(Arc::new(backend.clone()), CuratorConfig::default())
}
