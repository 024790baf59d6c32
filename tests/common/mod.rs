#![allow(dead_code)]

use lodestar::error::{LodestarError, Result};
use lodestar::llm::LlmGateway;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Deterministic stand-in for a language model: replays canned replies in
/// order and records every prompt it was sent so tests can assert on
/// prompt content.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts_seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmGateway for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.seen.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LodestarError::Llm("scripted replies exhausted".to_string()))
    }
}
