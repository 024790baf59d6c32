//! LLM Gateway Module
//!
//! One capability: a prompt goes in, completion text comes out. Providers
//! differ only in transport, so each is a thin adapter behind `LlmGateway`.
//! Calls are single-attempt; callers decide what a failure means for their
//! phase.

use crate::error::{LodestarError, Result};
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct OpenAiGateway {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiGateway {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("calling OpenAI model {}", self.model);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.2
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LodestarError::Llm(format!("LLM API call failed: {}", e)))?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LodestarError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(err) = response_json.get("error") {
            return Err(LodestarError::Llm(format!("LLM API error: {}", err)));
        }

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LodestarError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

pub struct GeminiGateway {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiGateway {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmGateway for GeminiGateway {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("calling Gemini model {}", self.model);
        let body = serde_json::json!({
            "contents": [
                {"parts": [{"text": prompt}]}
            ]
        });

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LodestarError::Llm(format!("LLM API call failed: {}", e)))?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LodestarError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(err) = response_json.get("error") {
            return Err(LodestarError::Llm(format!("LLM API error: {}", err)));
        }

        let content = response_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| LodestarError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}
